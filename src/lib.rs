//! calldata-pack compresses contract calldata into the compact format read by an on-chain
//! decompressor, and expands it back byte for byte.
//!
//! Compression works in layers:
//!
//! - The [`ElementCodec`] turns a value of up to 32 bytes into one tag byte plus a few trailing
//! 	bytes. Values can be dictionary references, runs of zeros, zero-padded words, decimal
//! 	numbers like `1.5e18`, or plain raw bytes, whichever is shortest.
//! - The [`ByteStreamCodec`] cuts whole byte strings into elements, either in fixed 32-byte
//! 	windows or by searching for the shortest overall encoding, and prefixes the result with a
//! 	transient dictionary of elements that repeat within the message.
//! - The [`chunk`] module splits ABI-encoded calls into typed fields, so no element has to
//! 	straddle two fields when compressing a call with [`SolutionCodec::compress_call`].
//! - The [`SolutionCodec`] has a purpose-built layout for batches of signed intents, the
//! 	argument of the `handleIntents` entry point.
//!
//! Dictionaries are published by a [`Registry`] and copied into a [`DictionaryStore`] by
//! [`DictionaryStore::sync`]. Compressed data only decodes against a store holding the same
//! entries it was encoded with.
//!
//! ```
//! use calldata_pack::*;
//!
//! let store = DictionaryStore::new(RegistryExpectations::new(1, [0u8; 20]));
//! let codec = ByteStreamCodec::new(&store, EncodeOptions::default());
//! let mut data = vec![0u8; 64];
//! data[31] = 7;
//! let compressed = codec.encode(&data);
//! assert!(compressed.len() < 8);
//! assert_eq!(codec.decode(&compressed).unwrap(), data);
//! ```

mod dictionary;
mod element;
mod error;
mod marker;
mod number;
mod registry;
mod solution;
mod solution_codec;
mod stream;
mod utils;

pub mod abi;
pub mod chunk;
pub mod exec_order;
pub mod signatures;

#[cfg(test)]
mod test_util;

pub use self::chunk::{decompose, Chunk};
pub use self::dictionary::{DictRef, DictionaryStore, DictionaryTier, SyncReport};
pub use self::element::ElementCodec;
pub use self::error::{Error, Result};
pub use self::marker::Tag;
pub use self::number::CompressedNumber;
pub use self::registry::{Registry, RegistryExpectations, RegistrySnapshot, Table};
pub use self::signatures::SignatureTable;
pub use self::solution::{Intent, Segment, Solution, HANDLE_INTENTS_SIGNATURE};
pub use self::solution_codec::SolutionCodec;
pub use self::stream::{ByteStreamCodec, EncodeOptions, Strategy};

/// The largest value a single element can hold.
pub const MAX_ELEMENT_SIZE: usize = 32;

/// Runs of zero bytes at least this long are worth cutting an element apart for.
pub const MIN_ZERO_RUN: usize = 3;

/// Maximum number of entries in a message's transient dictionary.
pub const MAX_TRANSIENT_ENTRIES: usize = 32;
