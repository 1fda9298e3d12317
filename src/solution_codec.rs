use byteorder::{BigEndian, ReadBytesExt};
use log::debug;

use crate::chunk::{decompose, Chunk};
use crate::dictionary::{DictionaryStore, SyncReport};
use crate::element::ElementCodec;
use crate::error::{Error, Result};
use crate::exec_order;
use crate::registry::{Registry, Table};
use crate::signatures::{SignatureTable, BUILTIN_SIGNATURES};
use crate::solution::{Intent, Segment, Solution};
use crate::stream::{ByteStreamCodec, EncodeOptions};
use crate::utils::{format_hex, parse_hex};

/// Largest segment length that fits the two-byte length form.
const MAX_SEGMENT_LEN: usize = 0x7fff;

/// Header byte of a compressed call whose selector has no alias.
const UNALIASED_SELECTOR: u8 = 0xff;

/// Compresses solutions and contract calls against a dictionary store.
///
/// The compressed solution layout is:
///
/// ```text
/// timestamp       4 bytes, big-endian
/// intent count    1 byte
///   sender        1 element, leading zeros trimmed
///   segment count 1 byte
///     standard    1 element, leading zeros trimmed
///     length      1 byte, or 2 bytes with the high bit set when 128 or more
///     data        byte stream of the given length
///   sig length    1 byte
///   signature     raw
/// order           packed execution order, to the end of the data
/// ```
///
/// The sender is re-padded to 20 bytes and the standard id to 32 bytes when decoding.
#[derive(Clone, Debug)]
pub struct SolutionCodec {
    store: DictionaryStore,
    signatures: SignatureTable,
    options: EncodeOptions,
}

impl SolutionCodec {
    pub fn new(store: DictionaryStore) -> Self {
        Self {
            store,
            signatures: SignatureTable::new(BUILTIN_SIGNATURES.iter().copied()),
            options: EncodeOptions::default(),
        }
    }

    /// Replace the signatures used to find structure in compressed calls.
    pub fn with_signatures(mut self, signatures: SignatureTable) -> Self {
        self.signatures = signatures;
        self
    }

    /// Options for segment data and call arguments. Both sides must use the same options.
    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dictionary(&self) -> &DictionaryStore {
        &self.store
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// Bring the dictionaries up to date with a registry. See [`DictionaryStore::sync`].
    pub async fn sync<R: Registry>(&mut self, registry: &R) -> Result<SyncReport> {
        self.store.sync(registry).await
    }

    fn streams(&self) -> ByteStreamCodec<'_> {
        ByteStreamCodec::new(&self.store, self.options.clone())
    }

    pub fn compress(&self, solution: &Solution) -> Result<Vec<u8>> {
        let elements = ElementCodec::new(&self.store);
        let streams = self.streams();
        let mut out = Vec::new();
        out.extend_from_slice(&solution.timestamp.to_be_bytes());
        out.push(count(solution.intents.len(), "intents")?);
        for intent in &solution.intents {
            out.extend(elements.encode_trimmed(&intent.sender)?);
            out.push(count(intent.segments.len(), "intent segments")?);
            for segment in &intent.segments {
                out.extend(elements.encode_trimmed(&segment.standard)?);
                let data = streams.encode(&segment.data);
                match data.len() {
                    len @ 0..=0x7f => out.push(len as u8),
                    len @ 0x80..=MAX_SEGMENT_LEN => {
                        out.extend_from_slice(&(0x8000 | len as u16).to_be_bytes())
                    }
                    len => {
                        return Err(Error::CapacityExceeded {
                            what: "compressed segment length",
                            max: MAX_SEGMENT_LEN,
                            actual: len,
                        })
                    }
                }
                out.extend(data);
            }
            out.push(count(intent.signature.len(), "signature length")?);
            out.extend_from_slice(&intent.signature);
        }
        out.extend(exec_order::pack(&solution.execution_order)?);
        debug!(
            "Compressed solution with {} intents into {} bytes",
            solution.intents.len(),
            out.len()
        );
        Ok(out)
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Solution> {
        let elements = ElementCodec::new(&self.store);
        let streams = self.streams();
        let mut buf = data;
        let timestamp = buf
            .read_u32::<BigEndian>()
            .map_err(|_| Error::truncated("read timestamp", data.len(), 4))?;
        let intent_count = read_count(&mut buf, "read intent count")?;
        let mut intents = Vec::with_capacity(intent_count);
        for _ in 0..intent_count {
            let (sender, used) = elements.decode_padded(buf, 20, "sender")?;
            buf = &buf[used..];
            let segment_count = read_count(&mut buf, "read segment count")?;
            let mut segments = Vec::with_capacity(segment_count);
            for _ in 0..segment_count {
                let (standard, used) = elements.decode_padded(buf, 32, "standard id")?;
                buf = &buf[used..];
                let mut len = read_count(&mut buf, "read segment length")?;
                if len & 0x80 != 0 {
                    let low = read_count(&mut buf, "read segment length")?;
                    len = ((len & 0x7f) << 8) | low;
                }
                let encoded = take(&mut buf, len, "read segment data")?;
                segments.push(Segment {
                    standard: to_array(&standard, "standard id")?,
                    data: streams.decode(encoded)?,
                });
            }
            let sig_len = read_count(&mut buf, "read signature length")?;
            let signature = take(&mut buf, sig_len, "read signature")?.to_vec();
            intents.push(Intent {
                sender: to_array(&sender, "sender")?,
                segments,
                signature,
            });
        }
        let execution_order = exec_order::unpack(buf)?;
        Ok(Solution {
            timestamp,
            intents,
            execution_order,
        })
    }

    /// Compress a hex-encoded `handleIntents` call. The output carries a `0x` marker exactly
    /// when the input did.
    pub fn compress_handle_intents_raw(&self, calldata: &str) -> Result<String> {
        let (call, prefixed) = parse_hex(calldata)?;
        let solution = Solution::from_calldata(&call)?;
        let compressed = self.compress(&solution)?;
        debug!(
            "handleIntents call of {} bytes compressed to {} bytes",
            call.len(),
            compressed.len()
        );
        Ok(format_hex(&compressed, prefixed))
    }

    /// Inverse of [`compress_handle_intents_raw`](Self::compress_handle_intents_raw).
    pub fn decompress_handle_intents_raw(&self, compressed: &str) -> Result<String> {
        let (data, prefixed) = parse_hex(compressed)?;
        let solution = self.decompress(&data)?;
        Ok(format_hex(&solution.to_calldata(), prefixed))
    }

    /// Compress any contract call.
    ///
    /// The selector becomes a one-byte alias when the registry published one, and `0xff`
    /// followed by the selector otherwise. The arguments are split into fields with the known
    /// signatures and encoded as one byte stream, so no element spans two fields.
    pub fn compress_call(&self, call: &[u8]) -> Result<Vec<u8>> {
        let selector = call
            .get(..4)
            .ok_or_else(|| Error::truncated("read selector", call.len(), 4))?;
        let mut out = Vec::new();
        match self.store.selector_alias(selector) {
            Some(alias) => out.push(alias),
            None => {
                out.push(UNALIASED_SELECTOR);
                out.extend_from_slice(selector);
            }
        }
        let chunks = decompose(call, &self.signatures);
        let args: Vec<Chunk> = match chunks.split_first() {
            Some((Chunk::Selector(_), rest)) => rest.to_vec(),
            _ => vec![Chunk::Opaque(&call[4..])],
        };
        out.extend(self.streams().encode_chunks(&args));
        debug!(
            "Compressed {}-byte call from {} chunks into {} bytes",
            call.len(),
            args.len(),
            out.len()
        );
        Ok(out)
    }

    pub fn decompress_call(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buf = data;
        let header = read_count(&mut buf, "read selector header")?;
        let mut call = if header as u8 == UNALIASED_SELECTOR {
            take(&mut buf, 4, "read selector")?.to_vec()
        } else {
            self.store
                .resolve(Table::FunctionSelectors, header)
                .map_err(|_| {
                    Error::malformed("selector alias", format!("no selector with alias {}", header))
                })?
                .to_vec()
        };
        call.extend(self.streams().decode(buf)?);
        Ok(call)
    }
}

fn count(len: usize, what: &'static str) -> Result<u8> {
    u8::try_from(len).map_err(|_| Error::CapacityExceeded {
        what,
        max: u8::MAX as usize,
        actual: len,
    })
}

fn read_count(buf: &mut &[u8], step: &'static str) -> Result<usize> {
    buf.read_u8()
        .map(|v| v as usize)
        .map_err(|_| Error::truncated(step, 0, 1))
}

fn take<'a>(buf: &mut &'a [u8], len: usize, step: &'static str) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(Error::truncated(step, buf.len(), len));
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

fn to_array<const N: usize>(bytes: &[u8], field: &'static str) -> Result<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| {
        Error::malformed(field, format!("expected {} bytes, got {}", N, bytes.len()))
    })
}
