//! The dictionary registry: the external, append-only source of dictionary entries.
//!
//! A [`DictionaryStore`](crate::DictionaryStore) catches up with a registry through
//! [`sync`](crate::DictionaryStore::sync). The registry is normally backed by contract storage
//! and network reads; [`RegistrySnapshot`] is an in-memory copy of one, useful offline and in
//! tests.

use std::convert::Infallible;

use serde::{Deserialize, Serialize};

use crate::utils::{hex_address, hex_list};

/// The tables a registry publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    /// Up to 32 entries, referenced with a single byte.
    Tier1,
    /// Up to 8192 entries, referenced with two bytes.
    Tier2,
    /// Up to 2^29 entries, referenced with four bytes.
    Tier3,
    /// Function selectors that may be replaced by a one-byte alias when compressing a raw call.
    FunctionSelectors,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Tier1,
        Table::Tier2,
        Table::Tier3,
        Table::FunctionSelectors,
    ];

    /// Maximum number of entries the table may ever hold.
    pub fn capacity(self) -> usize {
        match self {
            Table::Tier1 => 1 << 5,
            Table::Tier2 => 1 << 13,
            Table::Tier3 => 1 << 29,
            // 0xFF marks an un-aliased selector
            Table::FunctionSelectors => 255,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Table::Tier1 => "tier 1 dictionary",
            Table::Tier2 => "tier 2 dictionary",
            Table::Tier3 => "tier 3 dictionary",
            Table::FunctionSelectors => "function selector aliases",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Table::Tier1 => 0,
            Table::Tier2 => 1,
            Table::Tier3 => 2,
            Table::FunctionSelectors => 3,
        }
    }
}

/// A source of dictionary entries.
///
/// Every table is an ordered, append-only list. `entries` returns everything added at or after
/// position `since`, so a store only ever fetches what it hasn't seen yet.
#[allow(async_fn_in_trait)]
pub trait Registry {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Version of the on-chain decompressor the entries were published for.
    async fn compressor_version(&self) -> Result<u64, Self::Error>;

    /// Address of the contract that decompresses data built from these entries.
    async fn target_contract(&self) -> Result<[u8; 20], Self::Error>;

    /// All entries of `table` from position `since` onward.
    async fn entries(&self, table: Table, since: usize) -> Result<Vec<Vec<u8>>, Self::Error>;
}

/// What a caller expects a registry to report before trusting its entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryExpectations {
    pub compressor_version: u64,
    #[serde(with = "hex_address")]
    pub target_contract: [u8; 20],
}

impl RegistryExpectations {
    pub fn new(compressor_version: u64, target_contract: [u8; 20]) -> Self {
        Self {
            compressor_version,
            target_contract,
        }
    }
}

/// An in-memory registry. Entries are (de)serialized as hex strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySnapshot {
    pub compressor_version: u64,
    #[serde(with = "hex_address")]
    pub target_contract: [u8; 20],
    #[serde(default, with = "hex_list")]
    pub tier1: Vec<Vec<u8>>,
    #[serde(default, with = "hex_list")]
    pub tier2: Vec<Vec<u8>>,
    #[serde(default, with = "hex_list")]
    pub tier3: Vec<Vec<u8>>,
    #[serde(default, with = "hex_list")]
    pub function_selectors: Vec<Vec<u8>>,
}

impl RegistrySnapshot {
    pub fn new(expectations: &RegistryExpectations) -> Self {
        Self {
            compressor_version: expectations.compressor_version,
            target_contract: expectations.target_contract,
            ..Default::default()
        }
    }

    pub fn table(&self, table: Table) -> &[Vec<u8>] {
        match table {
            Table::Tier1 => &self.tier1,
            Table::Tier2 => &self.tier2,
            Table::Tier3 => &self.tier3,
            Table::FunctionSelectors => &self.function_selectors,
        }
    }

    pub fn table_mut(&mut self, table: Table) -> &mut Vec<Vec<u8>> {
        match table {
            Table::Tier1 => &mut self.tier1,
            Table::Tier2 => &mut self.tier2,
            Table::Tier3 => &mut self.tier3,
            Table::FunctionSelectors => &mut self.function_selectors,
        }
    }
}

impl Registry for RegistrySnapshot {
    type Error = Infallible;

    async fn compressor_version(&self) -> Result<u64, Infallible> {
        Ok(self.compressor_version)
    }

    async fn target_contract(&self) -> Result<[u8; 20], Infallible> {
        Ok(self.target_contract)
    }

    async fn entries(&self, table: Table, since: usize) -> Result<Vec<Vec<u8>>, Infallible> {
        Ok(self.table(table).iter().skip(since).cloned().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshot_from_json() {
        let json = r#"{
            "compressor_version": 3,
            "target_contract": "0x00000000000000000000000000000000000000aa",
            "tier1": ["0x00000000", "0xa9059cbb"],
            "tier3": ["0x1234"]
        }"#;
        let snapshot: RegistrySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.compressor_version, 3);
        assert_eq!(snapshot.target_contract[19], 0xaa);
        assert_eq!(snapshot.tier1[1], vec![0xa9, 0x05, 0x9c, 0xbb]);
        assert!(snapshot.tier2.is_empty());
        assert_eq!(snapshot.table(Table::Tier3), &[vec![0x12u8, 0x34]][..]);

        let back = serde_json::to_string(&snapshot).unwrap();
        let again: RegistrySnapshot = serde_json::from_str(&back).unwrap();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn entries_since() {
        let mut snapshot = RegistrySnapshot::default();
        snapshot.tier2 = vec![vec![1], vec![2], vec![3]];
        let fresh = futures_executor::block_on(snapshot.entries(Table::Tier2, 1)).unwrap();
        assert_eq!(fresh, vec![vec![2], vec![3]]);
        let fresh = futures_executor::block_on(snapshot.entries(Table::Tier2, 5)).unwrap();
        assert!(fresh.is_empty());
    }
}
