use crate::number::MANTISSA_WIDTHS;
use crate::MAX_ELEMENT_SIZE;

/// Element tags. The top 3 bits of a tag byte select the type, the low 5 bits carry a
/// type-specific payload.
///
/// Exposed for tools that inspect compressed data. Encoding and decoding go through
/// [`ElementCodec`](crate::ElementCodec) and never need tags directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    /// Reference into the transient dictionary of the current message.
    Transient(u8),
    /// Tier 1 dictionary index, 0-31.
    Tier1(u8),
    /// High 5 bits of a 13-bit tier 2 index. One more index byte follows.
    Tier2(u8),
    /// High 5 bits of a 29-bit tier 3 index. Three more index bytes follow.
    Tier3(u8),
    /// Run of zero bytes, holding the run length minus one.
    ZeroRun(u8),
    /// 32-byte word with leading zero bytes, holding the leading zero count minus one. The
    /// non-zero suffix follows.
    ZeroPadded(u8),
    /// Decimal number. The mantissa and a one-byte exponent follow.
    Decimal { size_class: u8, precision: u8 },
    /// Raw bytes, holding the length minus one. The bytes follow.
    Raw(u8),
}

impl Tag {
    /// Construct a tag from a single byte. Every byte is a valid tag.
    pub fn from_u8(n: u8) -> Tag {
        let payload = n & 0x1F;
        match n >> 5 {
            0 => Tag::Transient(payload),
            1 => Tag::Tier1(payload),
            2 => Tag::Tier2(payload),
            3 => Tag::Tier3(payload),
            4 => Tag::ZeroRun(payload),
            5 => Tag::ZeroPadded(payload),
            6 => Tag::Decimal {
                size_class: payload >> 3,
                precision: payload & 0x07,
            },
            _ => Tag::Raw(payload),
        }
    }

    /// Converts a tag into its single-byte representation. Assumes the payload is already masked
    /// appropriately.
    pub fn into_u8(self) -> u8 {
        match self {
            Tag::Transient(v) => v,
            Tag::Tier1(v) => 0x20 | v,
            Tag::Tier2(v) => 0x40 | v,
            Tag::Tier3(v) => 0x60 | v,
            Tag::ZeroRun(v) => 0x80 | v,
            Tag::ZeroPadded(v) => 0xa0 | v,
            Tag::Decimal {
                size_class,
                precision,
            } => 0xc0 | (size_class << 3) | precision,
            Tag::Raw(v) => 0xe0 | v,
        }
    }

    /// Number of bytes that follow this tag. This is a pure function of the tag byte, which is
    /// what lets the decoder run without backtracking.
    pub fn trailing_len(self) -> usize {
        match self {
            Tag::Transient(_) | Tag::Tier1(_) | Tag::ZeroRun(_) => 0,
            Tag::Tier2(_) => 1,
            Tag::Tier3(_) => 3,
            Tag::ZeroPadded(zeros) => MAX_ELEMENT_SIZE - (zeros as usize + 1),
            Tag::Decimal { precision, .. } => MANTISSA_WIDTHS[precision as usize] + 1,
            Tag::Raw(len) => len as usize + 1,
        }
    }

    pub fn name(&self) -> &'static str {
        use self::Tag::*;
        match self {
            Transient(_) => "Transient",
            Tier1(_) => "Tier1",
            Tier2(_) => "Tier2",
            Tier3(_) => "Tier3",
            ZeroRun(_) => "ZeroRun",
            ZeroPadded(_) => "ZeroPadded",
            Decimal { .. } => "Decimal",
            Raw(_) => "Raw",
        }
    }
}

impl From<u8> for Tag {
    fn from(val: u8) -> Tag {
        Tag::from_u8(val)
    }
}

impl From<Tag> for u8 {
    fn from(val: Tag) -> u8 {
        val.into_u8()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_byte_roundtrips() {
        for n in 0..=255u8 {
            let tag = Tag::from_u8(n);
            assert_eq!(tag.into_u8(), n, "tag {} didn't map back to 0x{:02x}", tag.name(), n);
        }
    }

    #[test]
    fn trailing_lengths() {
        assert_eq!(Tag::from_u8(0x00).trailing_len(), 0);
        assert_eq!(Tag::from_u8(0x3f).trailing_len(), 0);
        assert_eq!(Tag::from_u8(0x40).trailing_len(), 1);
        assert_eq!(Tag::from_u8(0x7f).trailing_len(), 3);
        assert_eq!(Tag::from_u8(0x9f).trailing_len(), 0);
        // 12 leading zeros leave a 20-byte suffix
        assert_eq!(Tag::ZeroPadded(11).trailing_len(), 20);
        // 16-byte mantissa plus the exponent
        assert_eq!(
            Tag::Decimal {
                size_class: 0,
                precision: 7
            }
            .trailing_len(),
            17
        );
        assert_eq!(Tag::Raw(31).trailing_len(), 32);
    }
}
