use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// An element longer than 32 bytes was handed to the element codec.
    InvalidElementSize(usize),
    /// Compressed data ended before the bytes promised by a tag or header.
    DecodeTruncated {
        step: &'static str,
        actual: usize,
        expected: usize,
    },
    /// Compressed or ABI-encoded data didn't have the expected structure. `field` names the
    /// sub-field that failed to parse.
    DecodeMalformed { field: &'static str, reason: String },
    /// Encoded data referenced a dictionary slot that doesn't exist in the decoder's tables.
    /// Tier 0 is the per-message transient dictionary.
    UnknownDictionaryIndex { tier: u8, index: usize },
    /// The dictionary registry reported a compressor version or target contract other than the
    /// one this store was configured for.
    VersionMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },
    /// A dictionary, the transient table, or a fixed-width wire field would overflow.
    CapacityExceeded {
        what: &'static str,
        max: usize,
        actual: usize,
    },
    /// Hex input text couldn't be parsed.
    InvalidHex(String),
    /// The dictionary registry failed while syncing.
    Registry(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Error::DecodeMalformed {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn truncated(step: &'static str, actual: usize, expected: usize) -> Self {
        Error::DecodeTruncated {
            step,
            actual,
            expected,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidElementSize(len) => write!(
                f,
                "Element is {} bytes long, elements may be at most 32 bytes",
                len
            ),
            Error::DecodeTruncated {
                step,
                actual,
                expected,
            } => write!(
                f,
                "Expected {} bytes, but only {} remained on step [{}]",
                expected, actual, step
            ),
            Error::DecodeMalformed { field, ref reason } => {
                write!(f, "Malformed data in [{}]: {}", field, reason)
            }
            Error::UnknownDictionaryIndex { tier, index } => {
                if tier == 0 {
                    write!(f, "Transient dictionary has no entry {}", index)
                } else {
                    write!(f, "Tier {} dictionary has no entry {}", tier, index)
                }
            }
            Error::VersionMismatch {
                what,
                ref expected,
                ref actual,
            } => write!(
                f,
                "Registry {} mismatch: expected {}, registry reports {}",
                what, expected, actual
            ),
            Error::CapacityExceeded { what, max, actual } => write!(
                f,
                "Capacity of {} exceeded: {} is more than the maximum of {}",
                what, actual, max
            ),
            Error::InvalidHex(ref err) => write!(f, "Invalid hex input: {}", err),
            Error::Registry(_) => f.write_str("Dictionary registry failure"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Registry(ref err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl std::convert::From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Self::InvalidHex(e.to_string())
    }
}
