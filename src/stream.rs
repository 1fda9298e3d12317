use std::collections::HashMap;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::dictionary::DictionaryStore;
use crate::element::ElementCodec;
use crate::error::{Error, Result};
use crate::marker::Tag;
use crate::{MAX_ELEMENT_SIZE, MAX_TRANSIENT_ENTRIES};

/// How a byte string is cut into elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Fixed 32-byte windows, left to right.
    Fast,
    /// Shortest total encoding over every way of cutting the input into elements. Never longer
    /// than [`Strategy::Fast`].
    #[default]
    Optimal,
}

/// Settings for [`ByteStreamCodec`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodeOptions {
    pub strategy: Strategy,
    /// Prefix the stream with a transient dictionary of repeated elements. Encoder and decoder
    /// must agree on this setting.
    pub transient: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Optimal,
            transient: true,
        }
    }
}

impl EncodeOptions {
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }
}

/// Encodes whole byte strings as a sequence of elements, optionally prefixed by a transient
/// dictionary.
///
/// With the transient dictionary enabled, the encoding is a count byte, that many element
/// encodings forming the table, then the body. Body elements that repeat a table entry are
/// replaced by one-byte transient references.
#[derive(Clone, Debug)]
pub struct ByteStreamCodec<'d> {
    elements: ElementCodec<'d>,
    options: EncodeOptions,
}

impl<'d> ByteStreamCodec<'d> {
    pub fn new(dict: &'d DictionaryStore, options: EncodeOptions) -> Self {
        Self {
            elements: ElementCodec::new(dict),
            options,
        }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    pub fn element_codec(&self) -> &ElementCodec<'d> {
        &self.elements
    }

    /// Encode a byte string with no knowledge of its structure.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        self.encode_segments(&[data])
    }

    /// Encode a decomposed call. Elements never straddle chunk boundaries, so each field is
    /// compressed according to its own shape.
    pub fn encode_chunks(&self, chunks: &[Chunk]) -> Vec<u8> {
        let segments: Vec<&[u8]> = chunks.iter().map(|c| c.bytes()).collect();
        self.encode_segments(&segments)
    }

    fn encode_segments(&self, segments: &[&[u8]]) -> Vec<u8> {
        let fast = self.assemble(segments.iter().flat_map(|s| self.fast(s)).collect());
        let out = match self.options.strategy {
            Strategy::Fast => fast,
            Strategy::Optimal => {
                let optimal =
                    self.assemble(segments.iter().flat_map(|s| self.optimal(s)).collect());
                if optimal.len() <= fast.len() {
                    optimal
                } else {
                    fast
                }
            }
        };
        trace!(
            "Encoded {} bytes into {} bytes",
            segments.iter().map(|s| s.len()).sum::<usize>(),
            out.len()
        );
        out
    }

    /// Decode a full stream.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut pos = 0;
        let mut table = Vec::new();
        if self.options.transient {
            let count = *data
                .first()
                .ok_or_else(|| Error::truncated("read transient dictionary size", 0, 1))?
                as usize;
            if count > MAX_TRANSIENT_ENTRIES {
                return Err(Error::CapacityExceeded {
                    what: "transient dictionary",
                    max: MAX_TRANSIENT_ENTRIES,
                    actual: count,
                });
            }
            pos = 1;
            for _ in 0..count {
                if let Some(Tag::Transient(_)) = data.get(pos).map(|b| Tag::from_u8(*b)) {
                    return Err(Error::malformed(
                        "transient dictionary",
                        "entry refers to the transient dictionary itself",
                    ));
                }
                let (value, used) = self.elements.decode(&data[pos..])?;
                table.push(value);
                pos += used;
            }
        }
        let mut out = Vec::with_capacity(data.len() * 2);
        while pos < data.len() {
            let (value, used) = self.elements.decode_with(&data[pos..], Some(&table))?;
            out.extend_from_slice(&value);
            pos += used;
        }
        Ok(out)
    }

    /// Fixed windows of 32 bytes, with whatever remains as the last window.
    fn fast(&self, data: &[u8]) -> Vec<Vec<u8>> {
        data.chunks(MAX_ELEMENT_SIZE)
            .flat_map(|window| self.elements.encode_window(window, true))
            .collect()
    }

    /// Shortest partition of `data` into windows of 1 to 32 bytes.
    ///
    /// Computed bottom-up from the end of the input: `cost[i]` is the length of the best encoding
    /// of `data[i..]`, and `choice[i]` the window length starting it. Window encodings are
    /// memoized by content, so repeated substrings (zero runs especially) are encoded once.
    fn optimal(&self, data: &[u8]) -> Vec<Vec<u8>> {
        let n = data.len();
        let mut encodings: HashMap<&[u8], Vec<u8>> = HashMap::new();
        let mut cost = vec![0usize; n + 1];
        let mut choice = vec![0usize; n];
        for i in (0..n).rev() {
            let mut best = usize::MAX;
            for len in (1..=MAX_ELEMENT_SIZE.min(n - i)).rev() {
                let window = &data[i..i + len];
                let enc_len = encodings
                    .entry(window)
                    .or_insert_with(|| self.elements.encode_single(window))
                    .len();
                let total = enc_len + cost[i + len];
                if total < best {
                    best = total;
                    choice[i] = len;
                }
            }
            cost[i] = best;
        }

        let mut out = Vec::new();
        let mut i = 0;
        while i < n {
            let len = choice[i];
            out.push(encodings[&data[i..i + len]].clone());
            i += len;
        }
        out
    }

    fn assemble(&self, elements: Vec<Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::with_capacity(elements.iter().map(|e| e.len()).sum::<usize>() + 1);
        if !self.options.transient {
            for elem in &elements {
                out.extend_from_slice(elem);
            }
            return out;
        }

        let table = transient_table(&elements);
        out.push(table.len() as u8);
        let mut lookup: HashMap<&[u8], u8> = HashMap::with_capacity(table.len());
        for (idx, entry) in table.iter().enumerate() {
            out.extend_from_slice(entry);
            lookup.insert(entry.as_slice(), idx as u8);
        }
        for elem in &elements {
            match lookup.get(elem.as_slice()) {
                Some(&idx) => out.push(Tag::Transient(idx).into()),
                None => out.extend_from_slice(elem),
            }
        }
        out
    }
}

/// Pick the transient dictionary for a list of element encodings.
///
/// Encodings seen at least twice are ranked by `len * (occurrences - 1)`, ties going to the one
/// that appears first, and the top [`MAX_TRANSIENT_ENTRIES`] kept. One-byte encodings are never
/// worth a reference.
pub(crate) fn transient_table(elements: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut counts: HashMap<&[u8], (usize, usize)> = HashMap::new();
    for (pos, elem) in elements.iter().enumerate() {
        if elem.len() < 2 {
            continue;
        }
        counts.entry(elem.as_slice()).or_insert((0, pos)).0 += 1;
    }
    let mut repeated: Vec<(&[u8], usize, usize)> = counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= 2)
        .map(|(elem, (count, first))| (elem, elem.len() * (count - 1), first))
        .collect();
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    repeated.truncate(MAX_TRANSIENT_ENTRIES);
    repeated.into_iter().map(|(elem, _, _)| elem.to_vec()).collect()
}
