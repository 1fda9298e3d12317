//! Bit packing for a solution's execution order.
//!
//! Each step is a 5-bit field written most significant bit first. A full 32-byte word holds one
//! zero separator bit followed by 51 fields. Whatever doesn't fill a word goes into a final,
//! shorter word whose fields are right-aligned behind zero padding bits.
//!
//! The packed form has no length prefix: the number of fields is a function of the byte length
//! alone (see [`step_count`]). When the real number of steps is smaller, the remaining fields
//! hold [`FILLER`], which the decoder drops again. That reserves the value 31, so steps are
//! limited to [`MAX_STEP`].

use crate::error::{Error, Result};

/// Value of the unused fields at the end of the packed order.
pub const FILLER: u8 = 31;

/// Largest step value that can be packed.
pub const MAX_STEP: u8 = FILLER - 1;

const FIELDS_PER_WORD: usize = 51;
const WORD: usize = 32;

/// Number of fields in a packed order of `bytes` bytes.
pub fn step_count(bytes: usize) -> usize {
    bytes * 8 / 5 - bytes / 160
}

/// Number of fields that physically fit in `bytes` bytes.
fn capacity(bytes: usize) -> usize {
    FIELDS_PER_WORD * (bytes / WORD) + (8 * (bytes % WORD)) / 5
}

/// Smallest packed length that holds `steps` fields.
fn packed_len(steps: usize) -> usize {
    let mut bytes = (steps * 5 + 7) / 8;
    while step_count(bytes) < steps || step_count(bytes) > capacity(bytes) {
        bytes += 1;
    }
    bytes
}

struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u32,
}

impl BitWriter {
    fn push(&mut self, value: u8, bits: u32) {
        self.acc = (self.acc << bits) | value as u32;
        self.bits += bits;
        while self.bits >= 8 {
            self.bits -= 8;
            self.out.push((self.acc >> self.bits) as u8);
        }
        self.acc &= (1 << self.bits) - 1;
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    bits: u32,
}

impl<'a> BitReader<'a> {
    fn take(&mut self, bits: u32) -> u8 {
        while self.bits < bits {
            // The caller never asks for more bits than the data holds
            let byte = self.data.get(self.pos).copied().unwrap_or(0);
            self.acc = (self.acc << 8) | byte as u32;
            self.bits += 8;
            self.pos += 1;
        }
        self.bits -= bits;
        let value = (self.acc >> self.bits) as u8 & ((1u16 << bits) - 1) as u8;
        self.acc &= (1 << self.bits) - 1;
        value
    }
}

/// Layout of a packed order: the number of full words, and the byte and field counts of the
/// final partial word.
fn layout(bytes: usize) -> (usize, usize, usize) {
    let words = bytes / WORD;
    let rest = bytes % WORD;
    (words, rest, step_count(bytes) - FIELDS_PER_WORD * words)
}

/// Pack an execution order.
pub fn pack(steps: &[u8]) -> Result<Vec<u8>> {
    if let Some(step) = steps.iter().find(|s| **s > MAX_STEP) {
        return Err(Error::CapacityExceeded {
            what: "execution order step",
            max: MAX_STEP as usize,
            actual: *step as usize,
        });
    }
    let bytes = packed_len(steps.len());
    let mut fields = steps.iter().copied().chain(std::iter::repeat(FILLER));
    let (words, rest, tail_fields) = layout(bytes);
    let mut writer = BitWriter {
        out: Vec::with_capacity(bytes),
        acc: 0,
        bits: 0,
    };
    for _ in 0..words {
        writer.push(0, 1);
        for field in fields.by_ref().take(FIELDS_PER_WORD) {
            writer.push(field, 5);
        }
    }
    if rest > 0 {
        let pad = (8 * rest - 5 * tail_fields) as u32;
        for _ in 0..pad {
            writer.push(0, 1);
        }
        for field in fields.take(tail_fields) {
            writer.push(field, 5);
        }
    }
    debug_assert_eq!(writer.out.len(), bytes);
    Ok(writer.out)
}

/// Unpack an execution order, dropping trailing filler fields.
pub fn unpack(data: &[u8]) -> Result<Vec<u8>> {
    let bytes = data.len();
    if step_count(bytes) > capacity(bytes) {
        return Err(Error::malformed(
            "execution order",
            format!("{} bytes can't hold {} fields", bytes, step_count(bytes)),
        ));
    }
    let (words, rest, tail_fields) = layout(bytes);
    let mut reader = BitReader {
        data,
        pos: 0,
        acc: 0,
        bits: 0,
    };
    let mut steps = Vec::with_capacity(step_count(bytes));
    for _ in 0..words {
        if reader.take(1) != 0 {
            return Err(Error::malformed("execution order", "word separator bit is set"));
        }
        for _ in 0..FIELDS_PER_WORD {
            steps.push(reader.take(5));
        }
    }
    if rest > 0 {
        for _ in 0..(8 * rest - 5 * tail_fields) {
            if reader.take(1) != 0 {
                return Err(Error::malformed("execution order", "padding bits are set"));
            }
        }
        for _ in 0..tail_fields {
            steps.push(reader.take(5));
        }
    }
    while steps.last() == Some(&FILLER) {
        steps.pop();
    }
    if steps.contains(&FILLER) {
        return Err(Error::malformed("execution order", "filler before the last step"));
    }
    Ok(steps)
}
