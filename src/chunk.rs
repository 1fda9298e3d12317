//! Splitting encoded calls into typed fields.
//!
//! A call is walked the way the ABI lays it out: the selector, then a head of static values and
//! offsets, then the tails those offsets point to. Every span found this way becomes a [`Chunk`].
//! `bytes` payloads that themselves start with a known selector are walked as calls too, which
//! exposes the fields of calls nested inside batching functions.
//!
//! Decomposition never fails. If the walk runs off the data, or the spans it finds don't tile
//! the input exactly, the whole call comes back as one [`Chunk::Opaque`]. Two pointers to the
//! same tail can never tile, so the walk gives up at the second one instead of walking the tail
//! again.

use std::collections::HashSet;

use log::debug;

use crate::abi::{check_array_len, padding, read_usize, read_word, ParamType, WORD};
use crate::error::{Error, Result};
use crate::signatures::SignatureTable;

/// Nested calls deeper than this are left as plain bytes.
const MAX_NESTING: usize = 8;

/// A typed span of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    Selector(&'a [u8]),
    /// A `uintN` or `intN` word.
    Number(&'a [u8]),
    Address(&'a [u8]),
    Bool(&'a [u8]),
    /// A `bytesN` word.
    FixedBytes(&'a [u8]),
    /// Contents of a `bytes` value, without its length or padding.
    Bytes(&'a [u8]),
    /// Contents of a `string` value, without its length or padding.
    String(&'a [u8]),
    /// Offset of a dynamic value.
    Pointer(&'a [u8]),
    /// Length word of a `bytes`, `string` or `T[]` value.
    Length(&'a [u8]),
    /// Zeros aligning a `bytes` or `string` value to a word.
    Padding(&'a [u8]),
    Opaque(&'a [u8]),
}

impl<'a> Chunk<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        match *self {
            Chunk::Selector(b)
            | Chunk::Number(b)
            | Chunk::Address(b)
            | Chunk::Bool(b)
            | Chunk::FixedBytes(b)
            | Chunk::Bytes(b)
            | Chunk::String(b)
            | Chunk::Pointer(b)
            | Chunk::Length(b)
            | Chunk::Padding(b)
            | Chunk::Opaque(b) => b,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chunk::Selector(_) => "selector",
            Chunk::Number(_) => "number",
            Chunk::Address(_) => "address",
            Chunk::Bool(_) => "bool",
            Chunk::FixedBytes(_) => "fixed bytes",
            Chunk::Bytes(_) => "bytes",
            Chunk::String(_) => "string",
            Chunk::Pointer(_) => "pointer",
            Chunk::Length(_) => "length",
            Chunk::Padding(_) => "padding",
            Chunk::Opaque(_) => "opaque",
        }
    }
}

/// Split a call into chunks, using `table` to find the argument types of its selector.
///
/// Concatenating the returned chunks always reproduces `call`. An empty call gives no chunks.
pub fn decompose<'a>(call: &'a [u8], table: &SignatureTable) -> Vec<Chunk<'a>> {
    if call.is_empty() {
        return Vec::new();
    }
    match walk_call(call, table, 0) {
        Ok(chunks) => chunks,
        Err(e) => {
            debug!("Treating {}-byte call as opaque: {}", call.len(), e);
            vec![Chunk::Opaque(call)]
        }
    }
}

/// Walk one call and return its chunks in order, failing unless they tile it exactly.
fn walk_call<'a>(call: &'a [u8], table: &SignatureTable, depth: usize) -> Result<Vec<Chunk<'a>>> {
    let selector = call
        .get(..4)
        .ok_or_else(|| Error::truncated("read selector", call.len(), 4))?;
    let function = table
        .lookup(selector)
        .ok_or_else(|| Error::malformed("selector", "no known signature"))?;

    let mut walker = Walker {
        data: call,
        table,
        depth,
        spans: vec![(0, Chunk::Selector(selector))],
        tails: HashSet::new(),
    };
    let inputs: Vec<&ParamType> = function.inputs.iter().collect();
    walker.sequence(&inputs, 4)?;

    let mut spans = walker.spans;
    spans.sort_by_key(|(offset, _)| *offset);
    let mut expected = 0;
    for (offset, chunk) in &spans {
        if *offset != expected {
            return Err(Error::malformed(
                "call layout",
                format!("{} chunk at {} but previous chunk ended at {}", chunk.name(), offset, expected),
            ));
        }
        expected += chunk.bytes().len();
    }
    if expected != call.len() {
        return Err(Error::malformed(
            "call layout",
            format!("{} trailing bytes after the last field", call.len().saturating_sub(expected)),
        ));
    }
    let chunks: Vec<Chunk> = spans.into_iter().map(|(_, c)| c).collect();
    if !chunks.iter().flat_map(|c| c.bytes()).eq(call.iter()) {
        return Err(Error::malformed("call layout", "chunks don't reproduce the call"));
    }
    Ok(chunks)
}

struct Walker<'a, 't> {
    data: &'a [u8],
    table: &'t SignatureTable,
    depth: usize,
    spans: Vec<(usize, Chunk<'a>)>,
    /// Start of every tail a pointer has led to so far.
    tails: HashSet<usize>,
}

impl<'a, 't> Walker<'a, 't> {
    fn push(&mut self, offset: usize, chunk: Chunk<'a>) {
        if !chunk.bytes().is_empty() {
            self.spans.push((offset, chunk));
        }
    }

    fn word(&self, pos: usize) -> Result<&'a [u8]> {
        read_word(self.data, pos, "read word")
    }

    /// Walk a tuple's head starting at `base`. Offsets in the head are relative to `base`.
    fn sequence(&mut self, types: &[&ParamType], base: usize) -> Result<()> {
        let mut pos = base;
        for ty in types {
            if ty.is_dynamic() {
                let word = self.word(pos)?;
                self.push(pos, Chunk::Pointer(word));
                let offset = read_usize(self.data, pos, "read pointer")?;
                let start = base
                    .checked_add(offset)
                    .filter(|s| *s < self.data.len())
                    .ok_or_else(|| Error::malformed("pointer", format!("offset {} is out of bounds", offset)))?;
                // An empty fixed array has an empty tail that the next tail may share
                let empty = matches!(ty, ParamType::FixedArray(_, 0));
                if !empty && !self.tails.insert(start) {
                    return Err(Error::malformed(
                        "pointer",
                        format!("tail at {} is already claimed by another pointer", start),
                    ));
                }
                self.dynamic(ty, start)?;
                pos += WORD;
            } else {
                self.fixed(ty, pos)?;
                pos += ty.head_size();
            }
        }
        Ok(())
    }

    fn fixed(&mut self, ty: &ParamType, pos: usize) -> Result<()> {
        match ty {
            ParamType::FixedArray(inner, len) => {
                let items: Vec<&ParamType> = std::iter::repeat(inner.as_ref()).take(*len).collect();
                self.sequence(&items, pos)
            }
            ParamType::Tuple(items) => {
                let items: Vec<&ParamType> = items.iter().collect();
                self.sequence(&items, pos)
            }
            _ => {
                let word = self.word(pos)?;
                let chunk = match ty {
                    ParamType::Address => Chunk::Address(word),
                    ParamType::Bool => Chunk::Bool(word),
                    ParamType::Uint(_) | ParamType::Int(_) => Chunk::Number(word),
                    ParamType::FixedBytes(_) => Chunk::FixedBytes(word),
                    _ => return Err(Error::malformed("call layout", "dynamic type in static position")),
                };
                self.push(pos, chunk);
                Ok(())
            }
        }
    }

    fn dynamic(&mut self, ty: &ParamType, start: usize) -> Result<()> {
        match ty {
            ParamType::Bytes | ParamType::String => {
                self.push(start, Chunk::Length(self.word(start)?));
                let len = read_usize(self.data, start, "read length")?;
                let begin = start + WORD;
                let padded = len + padding(len);
                let region = self.data.get(begin..begin + padded).ok_or_else(|| {
                    Error::truncated("read bytes", self.data.len().saturating_sub(begin), padded)
                })?;
                let (payload, pad) = region.split_at(len);
                if matches!(ty, ParamType::String) {
                    self.push(begin, Chunk::String(payload));
                } else {
                    self.payload(payload, begin);
                }
                self.push(begin + len, Chunk::Padding(pad));
                Ok(())
            }
            ParamType::Array(inner) => {
                self.push(start, Chunk::Length(self.word(start)?));
                let len = read_usize(self.data, start, "read array length")?;
                check_array_len(self.data, start + WORD, len)?;
                let items: Vec<&ParamType> = std::iter::repeat(inner.as_ref()).take(len).collect();
                self.sequence(&items, start + WORD)
            }
            _ => self.fixed(ty, start),
        }
    }

    /// A `bytes` payload: a nested call if it walks as one, plain bytes otherwise.
    fn payload(&mut self, payload: &'a [u8], begin: usize) {
        if self.depth < MAX_NESTING && payload.len() >= 4 {
            match walk_call(payload, self.table, self.depth + 1) {
                Ok(chunks) => {
                    let mut offset = begin;
                    for chunk in chunks {
                        let len = chunk.bytes().len();
                        self.push(offset, chunk);
                        offset += len;
                    }
                    return;
                }
                Err(e) => log::trace!("Payload at {} is not a nested call: {}", begin, e),
            }
        }
        self.push(begin, Chunk::Bytes(payload));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::abi::{encode, selector, word_from_usize, Token};
    use std::time::{Duration, Instant};

    fn call(signature: &str, args: &[Token]) -> Vec<u8> {
        let mut out = selector(signature).to_vec();
        out.extend(encode(args));
        out
    }

    fn joined(chunks: &[Chunk]) -> Vec<u8> {
        chunks.iter().flat_map(|c| c.bytes().iter().copied()).collect()
    }

    fn names(chunks: &[Chunk]) -> Vec<&'static str> {
        chunks.iter().map(|c| c.name()).collect()
    }

    #[test]
    fn static_call() {
        let data = call(
            "transfer(address,uint256)",
            &[Token::from_padded(&[0x42; 20]), Token::from_usize(1_000_000)],
        );
        let chunks = decompose(&data, SignatureTable::builtin());
        assert_eq!(names(&chunks), ["selector", "address", "number"]);
        assert_eq!(joined(&chunks), data);
    }

    #[test]
    fn dynamic_fields() {
        let table = SignatureTable::new(["store(string,bytes,uint256[])"]);
        let data = call(
            "store(string,bytes,uint256[])",
            &[
                Token::Bytes(b"hello".to_vec()),
                Token::Bytes(vec![0xee; 32]),
                Token::Array(vec![Token::from_usize(1), Token::from_usize(2)]),
            ],
        );
        let chunks = decompose(&data, &table);
        assert_eq!(
            names(&chunks),
            [
                "selector", "pointer", "pointer", "pointer", "length", "string", "padding",
                "length", "bytes", "length", "number", "number",
            ]
        );
        assert_eq!(chunks[5].bytes(), b"hello");
        assert_eq!(chunks[6].bytes().len(), 27);
        assert_eq!(joined(&chunks), data);
    }

    #[test]
    fn nested_calls() {
        let inner = call(
            "approve(address,uint256)",
            &[Token::from_padded(&[0x11; 20]), Token::from_usize(5)],
        );
        let data = call(
            "multicall(bytes[])",
            &[Token::Array(vec![Token::Bytes(inner.clone()), Token::Bytes(vec![1, 2, 3])])],
        );
        let chunks = decompose(&data, SignatureTable::builtin());
        assert_eq!(joined(&chunks), data);
        let names = names(&chunks);
        assert_eq!(names.iter().filter(|n| **n == "selector").count(), 2);
        assert!(names.contains(&"address"));
        assert!(chunks.contains(&Chunk::Bytes(&[1, 2, 3])));
        // The 68-byte approve call needs 28 bytes of padding
        assert!(chunks.iter().any(|c| matches!(c, Chunk::Padding(p) if p.len() == 28)));
    }

    #[test]
    fn tuples_and_fixed_arrays() {
        let signature = "f((address,bytes)[],uint8[2],(uint256,bool))";
        let table = SignatureTable::new([signature]);
        let data = call(
            signature,
            &[
                Token::Array(vec![Token::Tuple(vec![
                    Token::from_padded(&[7; 20]),
                    Token::Bytes(vec![9; 33]),
                ])]),
                Token::FixedArray(vec![Token::from_usize(1), Token::from_usize(2)]),
                Token::Tuple(vec![Token::from_usize(3), Token::from_usize(1)]),
            ],
        );
        let chunks = decompose(&data, &table);
        assert_eq!(joined(&chunks), data);
        assert!(!matches!(chunks[0], Chunk::Opaque(_)));
        assert_eq!(chunks.iter().filter(|c| matches!(c, Chunk::Bool(_))).count(), 1);
        assert_eq!(chunks.iter().filter(|c| matches!(c, Chunk::Number(_))).count(), 3);
    }

    #[test]
    fn opaque_fallbacks() {
        let table = SignatureTable::builtin();
        // Unknown selector
        let data = vec![1, 2, 3, 4, 5, 6];
        assert_eq!(decompose(&data, table), vec![Chunk::Opaque(&data)]);
        // Too short for its signature
        let mut data = call(
            "transfer(address,uint256)",
            &[Token::from_padded(&[0x42; 20]), Token::from_usize(1)],
        );
        data.truncate(50);
        assert_eq!(decompose(&data, table), vec![Chunk::Opaque(&data)]);
        // Trailing garbage
        let mut data = call("balanceOf(address)", &[Token::from_padded(&[1; 20])]);
        data.push(0);
        assert_eq!(decompose(&data, table), vec![Chunk::Opaque(&data)]);
        // Shorter than a selector
        assert_eq!(decompose(&[0xa9], table), vec![Chunk::Opaque(&[0xa9])]);
        assert!(decompose(&[], table).is_empty());
    }

    #[test]
    fn overlapping_tails_fall_back() {
        let table = SignatureTable::new(["two(bytes,bytes)"]);
        let mut data = call(
            "two(bytes,bytes)",
            &[Token::Bytes(vec![5; 4]), Token::Bytes(vec![5; 4])],
        );
        // Point both arguments at the first tail
        data[4 + 63] = 0x40;
        let chunks = decompose(&data, &table);
        assert_eq!(chunks, vec![Chunk::Opaque(&data)]);
    }

    /// `multicall(bytes[])` with `n` pointers that all lead to one tail holding `inner`.
    fn shared_tail(inner: &[u8], n: usize) -> Vec<u8> {
        let mut out = selector("multicall(bytes[])").to_vec();
        out.extend_from_slice(&word_from_usize(WORD));
        out.extend_from_slice(&word_from_usize(n));
        for _ in 0..n {
            out.extend_from_slice(&word_from_usize(n * WORD));
        }
        out.extend_from_slice(&word_from_usize(inner.len()));
        out.extend_from_slice(inner);
        out.resize(out.len() + padding(inner.len()), 0);
        out
    }

    fn nest(levels: usize, n: usize) -> Vec<u8> {
        let mut data = call("balanceOf(address)", &[Token::from_padded(&[3; 20])]);
        for _ in 0..levels {
            data = shared_tail(&data, n);
        }
        data
    }

    #[test]
    fn shared_tails_are_rejected_quickly() {
        let table = SignatureTable::builtin();
        let data = nest(9, 8);
        let start = Instant::now();
        let chunks = decompose(&data, table);
        assert!(start.elapsed() < Duration::from_secs(1), "took {:?}", start.elapsed());
        assert_eq!(chunks, vec![Chunk::Opaque(&data)]);

        // With one pointer per level the same nesting is a valid call. Calls below the nesting
        // limit stay plain bytes.
        let data = nest(9, 1);
        let chunks = decompose(&data, table);
        assert_eq!(joined(&chunks), data);
        assert_eq!(names(&chunks).iter().filter(|n| **n == "selector").count(), MAX_NESTING + 1);
        assert!(!chunks.iter().any(|c| matches!(c, Chunk::Opaque(_))));
    }

    #[test]
    fn nested_arrays() {
        let table = SignatureTable::new(["g(uint256[][])"]);
        let data = call(
            "g(uint256[][])",
            &[Token::Array(vec![
                Token::Array(vec![Token::from_usize(1), Token::from_usize(2)]),
                Token::Array(vec![Token::from_usize(3)]),
            ])],
        );
        let chunks = decompose(&data, &table);
        assert_eq!(
            names(&chunks),
            [
                "selector", "pointer", "length", "pointer", "pointer", "length", "number",
                "number", "length", "number",
            ]
        );
        assert_eq!(chunks[9].bytes(), &word_from_usize(3)[..]);
        assert_eq!(joined(&chunks), data);
    }

    #[test]
    fn fixed_arrays_of_dynamic_values() {
        let signature = "h(bytes[2],string[][2])";
        let table = SignatureTable::new([signature]);
        let data = call(
            signature,
            &[
                Token::FixedArray(vec![Token::Bytes(vec![1; 3]), Token::Bytes(vec![2; 40])]),
                Token::FixedArray(vec![
                    Token::Array(vec![Token::Bytes(b"ab".to_vec())]),
                    Token::Array(vec![Token::Bytes(b"cd".to_vec()), Token::Bytes(b"ef".to_vec())]),
                ]),
            ],
        );
        let chunks = decompose(&data, &table);
        assert_eq!(joined(&chunks), data);
        assert!(!chunks.iter().any(|c| matches!(c, Chunk::Opaque(_))));
        assert!(chunks.contains(&Chunk::Bytes(&[1; 3])));
        assert!(chunks.contains(&Chunk::Bytes(&[2; 40])));
        let strings: Vec<&[u8]> = chunks
            .iter()
            .filter(|c| matches!(c, Chunk::String(_)))
            .map(|c| c.bytes())
            .collect();
        assert_eq!(strings, [&b"ab"[..], &b"cd"[..], &b"ef"[..]]);
        // Both fixed arrays are dynamic, so the head is two pointers
        assert_eq!(names(&chunks)[..3], ["selector", "pointer", "pointer"]);
    }

    #[test]
    fn pointer_out_of_bounds() {
        let table = SignatureTable::new(["one(bytes)"]);
        let mut data = call("one(bytes)", &[Token::Bytes(vec![5; 4])]);
        data[4 + 31] = 0xf0;
        assert_eq!(decompose(&data, &table), vec![Chunk::Opaque(&data)]);
    }

    #[test]
    fn random_data_reconstructs() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let table = SignatureTable::builtin();
        let base = call(
            "multicall(bytes[])",
            &[Token::Array(vec![Token::Bytes(vec![0xab; 70])])],
        );
        for _ in 0..200 {
            let mut data = base.clone();
            let idx = rng.gen_range(4..data.len());
            data[idx] = rng.gen();
            let chunks = decompose(&data, table);
            assert_eq!(joined(&chunks), data);
        }
    }
}
