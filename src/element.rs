use byteorder::{BigEndian, ReadBytesExt};

use crate::dictionary::{DictRef, DictionaryStore};
use crate::error::{Error, Result};
use crate::marker::Tag;
use crate::number::CompressedNumber;
use crate::registry::Table;
use crate::{MAX_ELEMENT_SIZE, MIN_ZERO_RUN};

/// Encodes and decodes single elements: byte strings of 1 to 32 bytes, each turned into one tag
/// byte plus whatever trailing bytes the tag calls for.
#[derive(Clone, Copy, Debug)]
pub struct ElementCodec<'d> {
    dict: &'d DictionaryStore,
}

impl<'d> ElementCodec<'d> {
    pub fn new(dict: &'d DictionaryStore) -> Self {
        Self { dict }
    }

    pub fn dictionary(&self) -> &'d DictionaryStore {
        self.dict
    }

    /// Encode one element as a single tagged value.
    pub fn encode(&self, elem: &[u8]) -> Result<Vec<u8>> {
        check_size(elem)?;
        Ok(self.encode_single(elem))
    }

    /// Encode a fixed-width value whose leading zero bytes can be restored by the decoder. Both
    /// the trimmed and the full value are tried and the shorter encoding kept, so the result must
    /// be read back with [`decode_padded`](Self::decode_padded) and the same width.
    pub fn encode_trimmed(&self, value: &[u8]) -> Result<Vec<u8>> {
        let full = self.encode(value)?;
        let zeros = leading_zeros(value);
        if zeros == 0 || zeros == value.len() {
            return Ok(full);
        }
        let trimmed = self.encode_single(&value[zeros..]);
        Ok(if trimmed.len() < full.len() { trimmed } else { full })
    }

    /// Decode one element, returning it along with the number of bytes consumed.
    pub fn decode(&self, data: &[u8]) -> Result<(Vec<u8>, usize)> {
        self.decode_with(data, None)
    }

    /// Decode an element written by [`encode_trimmed`](Self::encode_trimmed), left-padding it
    /// with zeros back to `width` bytes.
    pub fn decode_padded(
        &self,
        data: &[u8],
        width: usize,
        field: &'static str,
    ) -> Result<(Vec<u8>, usize)> {
        let (value, used) = self.decode(data)?;
        if value.len() > width {
            return Err(Error::malformed(
                field,
                format!("decoded {} bytes into a {}-byte field", value.len(), width),
            ));
        }
        let mut padded = vec![0u8; width - value.len()];
        padded.extend_from_slice(&value);
        Ok((padded, used))
    }

    /// Decode one element, resolving transient references against `transient` if given.
    pub(crate) fn decode_with(
        &self,
        data: &[u8],
        transient: Option<&[Vec<u8>]>,
    ) -> Result<(Vec<u8>, usize)> {
        let (&first, rest) = data
            .split_first()
            .ok_or_else(|| Error::truncated("read element tag", 0, 1))?;
        let tag = Tag::from_u8(first);
        let need = tag.trailing_len();
        if rest.len() < need {
            return Err(Error::truncated(trailing_step(tag), rest.len(), need));
        }
        let mut trailing = &rest[..need];
        let value = match tag {
            Tag::Transient(idx) => {
                let idx = idx as usize;
                transient
                    .and_then(|table| table.get(idx))
                    .cloned()
                    .ok_or(Error::UnknownDictionaryIndex {
                        tier: 0,
                        index: idx,
                    })?
            }
            Tag::Tier1(idx) => self.dict.resolve(Table::Tier1, idx as usize)?.to_vec(),
            Tag::Tier2(high) => {
                let low = trailing
                    .read_u8()
                    .map_err(|_| Error::truncated("decode Tier2 index", 0, 1))?;
                let idx = ((high as usize) << 8) | low as usize;
                self.dict.resolve(Table::Tier2, idx)?.to_vec()
            }
            Tag::Tier3(high) => {
                let low = trailing
                    .read_u24::<BigEndian>()
                    .map_err(|_| Error::truncated("decode Tier3 index", 0, 3))?;
                let idx = ((high as usize) << 24) | low as usize;
                self.dict.resolve(Table::Tier3, idx)?.to_vec()
            }
            Tag::ZeroRun(len) => vec![0u8; len as usize + 1],
            Tag::ZeroPadded(zeros) => {
                let mut value = vec![0u8; zeros as usize + 1];
                value.extend_from_slice(trailing);
                value
            }
            Tag::Decimal {
                size_class,
                precision,
            } => CompressedNumber::decode(size_class, precision, trailing)?.to_be_bytes()?,
            Tag::Raw(_) => trailing.to_vec(),
        };
        Ok((value, 1 + need))
    }

    /// Encode an element of 1 to 32 bytes as a single tagged value.
    pub(crate) fn encode_single(&self, elem: &[u8]) -> Vec<u8> {
        let mut pieces = self.do_encode(elem, false);
        debug_assert_eq!(pieces.len(), 1);
        pieces.swap_remove(0)
    }

    /// Encode a window of 1 to 32 bytes. When `split` is set, the window may come back as several
    /// elements, cut at long runs of zero bytes.
    pub(crate) fn encode_window(&self, window: &[u8], split: bool) -> Vec<Vec<u8>> {
        self.do_encode(window, split)
    }

    /// Compute every applicable encoding and keep the shortest. Candidates are offered in
    /// priority order and only a strictly shorter one replaces the current best, so ties go to
    /// the earlier candidate.
    fn do_encode(&self, elem: &[u8], split: bool) -> Vec<Vec<u8>> {
        debug_assert!(!elem.is_empty() && elem.len() <= MAX_ELEMENT_SIZE);
        let mut best = Best::default();

        if let Some(dict_ref) = self.dict.lookup(elem) {
            best.offer(vec![encode_ref(dict_ref)]);
        }

        let zeros = bytecount::count(elem, 0);
        if zeros == elem.len() {
            best.offer(vec![vec![Tag::ZeroRun(elem.len() as u8 - 1).into()]]);
        } else if split && zeros >= MIN_ZERO_RUN {
            let pieces = split_zero_runs(elem);
            if pieces.len() > 1 {
                best.offer(
                    pieces
                        .into_iter()
                        .flat_map(|piece| self.do_encode(piece, false))
                        .collect(),
                );
            }
        }

        let leading = leading_zeros(elem);
        if elem.len() == MAX_ELEMENT_SIZE && leading > 0 {
            let mut enc = Vec::with_capacity(1 + MAX_ELEMENT_SIZE - leading);
            enc.push(Tag::ZeroPadded(leading as u8 - 1).into());
            enc.extend_from_slice(&elem[leading..]);
            best.offer(vec![enc]);
        }

        if let Some(num) = CompressedNumber::from_be_bytes(elem) {
            let mut enc = Vec::with_capacity(num.encoded_len());
            num.encode_vec(&mut enc);
            best.offer(vec![enc]);
        }

        let mut raw = Vec::with_capacity(1 + elem.len());
        raw.push(Tag::Raw(elem.len() as u8 - 1).into());
        raw.extend_from_slice(elem);
        best.offer(vec![raw]);

        best.take()
    }
}

#[derive(Default)]
struct Best {
    pieces: Vec<Vec<u8>>,
    len: Option<usize>,
}

impl Best {
    fn offer(&mut self, pieces: Vec<Vec<u8>>) {
        let len = pieces.iter().map(|p| p.len()).sum();
        if self.len.map_or(true, |best| len < best) {
            self.pieces = pieces;
            self.len = Some(len);
        }
    }

    fn take(self) -> Vec<Vec<u8>> {
        self.pieces
    }
}

fn check_size(elem: &[u8]) -> Result<()> {
    if elem.is_empty() || elem.len() > MAX_ELEMENT_SIZE {
        Err(Error::InvalidElementSize(elem.len()))
    } else {
        Ok(())
    }
}

fn leading_zeros(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| **b == 0).count()
}

fn encode_ref(dict_ref: DictRef) -> Vec<u8> {
    match dict_ref {
        DictRef::Tier1(idx) => vec![Tag::Tier1(idx as u8).into()],
        DictRef::Tier2(idx) => vec![Tag::Tier2((idx >> 8) as u8).into(), idx as u8],
        DictRef::Tier3(idx) => {
            let bytes = idx.to_be_bytes();
            vec![Tag::Tier3(bytes[0]).into(), bytes[1], bytes[2], bytes[3]]
        }
    }
}

/// Cut an element at every run of at least [`MIN_ZERO_RUN`] zero bytes. Each run becomes its own
/// piece; shorter runs stay inside their neighbours.
fn split_zero_runs(elem: &[u8]) -> Vec<&[u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < elem.len() {
        if elem[i] != 0 {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < elem.len() && elem[i] == 0 {
            i += 1;
        }
        if i - run_start >= MIN_ZERO_RUN {
            if start < run_start {
                pieces.push(&elem[start..run_start]);
            }
            pieces.push(&elem[run_start..i]);
            start = i;
        }
    }
    if start < elem.len() {
        pieces.push(&elem[start..]);
    }
    pieces
}

fn trailing_step(tag: Tag) -> &'static str {
    match tag {
        Tag::Tier2(_) => "get Tier2 index",
        Tag::Tier3(_) => "get Tier3 index",
        Tag::ZeroPadded(_) => "get ZeroPadded suffix",
        Tag::Decimal { .. } => "get Decimal mantissa",
        Tag::Raw(_) => "get Raw content",
        _ => "get element content",
    }
}
