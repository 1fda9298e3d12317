use num_bigint::BigUint;
use num_traits::{pow, Zero};

use crate::error::{Error, Result};
use crate::marker::Tag;

/// Byte widths a decimal mantissa may occupy, indexed by precision class.
pub(crate) const MANTISSA_WIDTHS: [usize; 8] = [1, 2, 3, 4, 6, 8, 12, 16];

/// Element widths a decimal number may decode to, indexed by size class.
pub(crate) const SIZE_CLASSES: [usize; 4] = [32, 16, 8, 4];

/// A non-negative integer re-expressed as `mantissa * 10^shift`.
///
/// Token amounts are usually round decimal numbers (`1.5 * 10^18` and the like), which take a
/// full word as binary but only a couple of significant digits in decimal. Only values whose
/// width is one of the [`SIZE_CLASSES`] and whose mantissa fits one of the
/// [`MANTISSA_WIDTHS`] have a compressed form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedNumber {
    mantissa: BigUint,
    shift: u8,
    size_class: u8,
    precision: u8,
}

impl CompressedNumber {
    /// Try to compress a big-endian unsigned integer element. Zero is left to the zero-run
    /// encoding and returns `None`.
    pub fn from_be_bytes(bytes: &[u8]) -> Option<Self> {
        let size_class = SIZE_CLASSES.iter().position(|&s| s == bytes.len())? as u8;
        let value = BigUint::from_bytes_be(bytes);
        if value.is_zero() {
            return None;
        }
        let digits = value.to_str_radix(10);
        let significant = digits.trim_end_matches('0');
        let shift = (digits.len() - significant.len()) as u8;
        let mantissa = BigUint::parse_bytes(significant.as_bytes(), 10)?;
        let mantissa_len = ((mantissa.bits() + 7) / 8) as usize;
        let precision = MANTISSA_WIDTHS.iter().position(|&w| w >= mantissa_len)? as u8;
        Some(Self {
            mantissa,
            shift,
            size_class,
            precision,
        })
    }

    pub fn mantissa(&self) -> &BigUint {
        &self.mantissa
    }

    pub fn shift(&self) -> u8 {
        self.shift
    }

    /// Width of the element this number decodes to.
    pub fn size(&self) -> usize {
        SIZE_CLASSES[self.size_class as usize]
    }

    /// Width of the mantissa on the wire.
    pub fn mantissa_width(&self) -> usize {
        MANTISSA_WIDTHS[self.precision as usize]
    }

    /// Total encoded length: tag, mantissa, and exponent byte.
    pub fn encoded_len(&self) -> usize {
        self.mantissa_width() + 2
    }

    pub fn encode_vec(&self, buf: &mut Vec<u8>) {
        buf.push(
            Tag::Decimal {
                size_class: self.size_class,
                precision: self.precision,
            }
            .into(),
        );
        let mantissa = self.mantissa.to_bytes_be();
        let width = self.mantissa_width();
        buf.resize(buf.len() + width - mantissa.len(), 0);
        buf.extend_from_slice(&mantissa);
        buf.push(self.shift);
    }

    /// Rebuild the number from a decimal tag's fields and its trailing bytes (mantissa followed
    /// by the exponent byte).
    pub fn decode(size_class: u8, precision: u8, trailing: &[u8]) -> Result<Self> {
        let width = MANTISSA_WIDTHS[precision as usize];
        if trailing.len() != width + 1 {
            return Err(Error::truncated(
                "decode decimal mantissa",
                trailing.len(),
                width + 1,
            ));
        }
        if size_class as usize >= SIZE_CLASSES.len() {
            return Err(Error::malformed(
                "decimal size class",
                format!("size class {} is not defined", size_class),
            ));
        }
        Ok(Self {
            mantissa: BigUint::from_bytes_be(&trailing[..width]),
            shift: trailing[width],
            size_class,
            precision,
        })
    }

    /// Expand into a big-endian element of [`size`](Self::size) bytes. Fails if the value
    /// doesn't fit.
    pub fn to_be_bytes(&self) -> Result<Vec<u8>> {
        let size = self.size();
        let value = &self.mantissa * pow(BigUint::from(10u8), self.shift as usize);
        if value.bits() > (size as u64) * 8 {
            return Err(Error::malformed(
                "decimal value",
                format!(
                    "{} * 10^{} does not fit in {} bytes",
                    self.mantissa, self.shift, size
                ),
            ));
        }
        let bytes = if value.is_zero() {
            Vec::new()
        } else {
            value.to_bytes_be()
        };
        let mut out = vec![0u8; size - bytes.len()];
        out.extend_from_slice(&bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn word(value: u128) -> Vec<u8> {
        let mut out = vec![0u8; 16];
        out.extend_from_slice(&value.to_be_bytes());
        out
    }

    #[test]
    fn one_point_two_three_ether() {
        let num = CompressedNumber::from_be_bytes(&word(1_230_000_000_000_000_000)).unwrap();
        assert_eq!(num.mantissa(), &BigUint::from(123u8));
        assert_eq!(num.shift(), 16);
        assert_eq!(num.mantissa_width(), 1);
        assert_eq!(num.encoded_len(), 3);

        let mut enc = Vec::new();
        num.encode_vec(&mut enc);
        assert_eq!(enc, vec![0xc0, 123, 16]);
        let dec = CompressedNumber::decode(0, 0, &enc[1..]).unwrap();
        assert_eq!(dec.to_be_bytes().unwrap(), word(1_230_000_000_000_000_000));
    }

    #[test]
    fn picks_smallest_mantissa_width() {
        // 70000 needs 3 bytes of mantissa once the trailing zeros are stripped: 7 * 10^4 needs one
        let num = CompressedNumber::from_be_bytes(&word(70_000)).unwrap();
        assert_eq!(num.mantissa_width(), 1);
        // 65537 has no trailing zeros and needs 3 bytes
        let num = CompressedNumber::from_be_bytes(&word(65_537)).unwrap();
        assert_eq!(num.shift(), 0);
        assert_eq!(num.mantissa_width(), 3);
        // 5 byte mantissas round up to the 6 byte class
        let num = CompressedNumber::from_be_bytes(&word(0x01_0000_0001)).unwrap();
        assert_eq!(num.mantissa_width(), 6);
    }

    #[test]
    fn rejects_unsupported_shapes() {
        assert!(CompressedNumber::from_be_bytes(&[0u8; 32]).is_none());
        assert!(CompressedNumber::from_be_bytes(&[1u8; 20]).is_none());
        // All 32 bytes significant, far beyond a 16-byte mantissa
        assert!(CompressedNumber::from_be_bytes(&[0xffu8; 32]).is_none());
    }

    #[test]
    fn smaller_size_classes() {
        let value = 25_000_000u64.to_be_bytes();
        let num = CompressedNumber::from_be_bytes(&value).unwrap();
        assert_eq!(num.size(), 8);
        assert_eq!(num.to_be_bytes().unwrap(), value.to_vec());
    }

    #[test]
    fn overflow_is_malformed() {
        // 255 * 10^77 is far past 2^256
        let err = CompressedNumber::decode(0, 0, &[255, 77])
            .unwrap()
            .to_be_bytes()
            .unwrap_err();
        assert!(matches!(err, Error::DecodeMalformed { .. }));
        // 4-byte size class overflows much sooner
        let err = CompressedNumber::decode(3, 0, &[1, 10])
            .unwrap()
            .to_be_bytes()
            .unwrap_err();
        assert!(matches!(err, Error::DecodeMalformed { .. }));
    }
}
