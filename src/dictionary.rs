use std::collections::HashMap;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::registry::{Registry, RegistryExpectations, Table};
use crate::MAX_ELEMENT_SIZE;

/// An append-only lookup table from byte strings to dense indices.
///
/// Indices are handed out in insertion order and never reused or renumbered. If the same bytes
/// are appended twice, lookups resolve to the first index.
#[derive(Clone, Debug)]
pub struct DictionaryTier {
    entries: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, u32>,
    table: Table,
}

impl DictionaryTier {
    pub fn new(table: Table) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            table,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(|v| v.as_slice())
    }

    pub fn lookup(&self, bytes: &[u8]) -> Option<u32> {
        self.index.get(bytes).copied()
    }

    /// Append an entry, returning its index.
    pub fn push(&mut self, entry: Vec<u8>) -> Result<u32> {
        if self.entries.len() >= self.capacity() {
            return Err(Error::CapacityExceeded {
                what: self.table.name(),
                max: self.capacity(),
                actual: self.entries.len() + 1,
            });
        }
        match self.table {
            Table::FunctionSelectors if entry.len() != 4 => {
                return Err(Error::malformed(
                    "function selector alias",
                    format!("selectors are 4 bytes, got {}", entry.len()),
                ))
            }
            _ if entry.is_empty() || entry.len() > MAX_ELEMENT_SIZE => {
                return Err(Error::InvalidElementSize(entry.len()))
            }
            _ => (),
        }
        let idx = self.entries.len() as u32;
        self.index.entry(entry.clone()).or_insert(idx);
        self.entries.push(entry);
        Ok(idx)
    }
}

/// A dictionary hit, in the order the element codec prefers them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DictRef {
    Tier1(u32),
    Tier2(u32),
    Tier3(u32),
}

/// Counts of entries added by a [`DictionaryStore::sync`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tier1: usize,
    pub tier2: usize,
    pub tier3: usize,
    pub function_selectors: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.tier1 + self.tier2 + self.tier3 + self.function_selectors
    }
}

/// The persistent dictionaries shared by encoder and decoder.
///
/// A store starts empty and only grows through [`sync`](Self::sync), which appends whatever the
/// registry published since the last sync. Encoder and decoder must hold the same store contents
/// for compressed data to decode; cloning a store is the way to keep a snapshot.
#[derive(Clone, Debug)]
pub struct DictionaryStore {
    tiers: [DictionaryTier; 4],
    expectations: RegistryExpectations,
}

impl DictionaryStore {
    pub fn new(expectations: RegistryExpectations) -> Self {
        Self {
            tiers: Table::ALL.map(DictionaryTier::new),
            expectations,
        }
    }

    pub fn expectations(&self) -> &RegistryExpectations {
        &self.expectations
    }

    pub fn tier(&self, table: Table) -> &DictionaryTier {
        &self.tiers[table.index()]
    }

    /// Find the cheapest dictionary reference for an element.
    pub fn lookup(&self, bytes: &[u8]) -> Option<DictRef> {
        if let Some(idx) = self.tier(Table::Tier1).lookup(bytes) {
            return Some(DictRef::Tier1(idx));
        }
        if let Some(idx) = self.tier(Table::Tier2).lookup(bytes) {
            return Some(DictRef::Tier2(idx));
        }
        self.tier(Table::Tier3).lookup(bytes).map(DictRef::Tier3)
    }

    /// Resolve a reference from compressed data.
    pub fn resolve(&self, table: Table, index: usize) -> Result<&[u8]> {
        self.tier(table)
            .get(index)
            .ok_or(Error::UnknownDictionaryIndex {
                tier: table.index() as u8 + 1,
                index,
            })
    }

    /// One-byte alias for a function selector, if the registry published one.
    pub fn selector_alias(&self, selector: &[u8]) -> Option<u8> {
        self.tier(Table::FunctionSelectors)
            .lookup(selector)
            .map(|idx| idx as u8)
    }

    /// Catch up with the registry.
    ///
    /// The registry's compressor version and target contract are checked first; a mismatch is a
    /// hard error and nothing is fetched. Each table is then fetched from its current length
    /// onward. New entries go into a copy of the tables that only replaces the live ones once
    /// everything has been fetched, so a failed sync leaves the store untouched. Syncing an
    /// up-to-date store is a no-op.
    pub async fn sync<R: Registry>(&mut self, registry: &R) -> Result<SyncReport> {
        let version = registry
            .compressor_version()
            .await
            .map_err(|e| Error::Registry(Box::new(e)))?;
        if version != self.expectations.compressor_version {
            return Err(Error::VersionMismatch {
                what: "compressor version",
                expected: self.expectations.compressor_version.to_string(),
                actual: version.to_string(),
            });
        }
        let target = registry
            .target_contract()
            .await
            .map_err(|e| Error::Registry(Box::new(e)))?;
        if target != self.expectations.target_contract {
            return Err(Error::VersionMismatch {
                what: "target contract",
                expected: crate::utils::format_hex(&self.expectations.target_contract, true),
                actual: crate::utils::format_hex(&target, true),
            });
        }

        let mut next = self.tiers.clone();
        let mut report = SyncReport::default();
        for table in Table::ALL {
            let tier = &mut next[table.index()];
            let fresh = registry
                .entries(table, tier.len())
                .await
                .map_err(|e| Error::Registry(Box::new(e)))?;
            let added = fresh.len();
            for entry in fresh {
                tier.push(entry)?;
            }
            match table {
                Table::Tier1 => report.tier1 = added,
                Table::Tier2 => report.tier2 = added,
                Table::Tier3 => report.tier3 = added,
                Table::FunctionSelectors => report.function_selectors = added,
            }
            trace!("{}: {} new entries, {} total", table.name(), added, tier.len());
        }
        self.tiers = next;
        debug!("Dictionary sync added {} entries", report.total());
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::RegistrySnapshot;
    use futures_executor::block_on;

    fn expectations() -> RegistryExpectations {
        RegistryExpectations::new(1, [0x11; 20])
    }

    #[test]
    fn tier_indices_are_dense() {
        let mut tier = DictionaryTier::new(Table::Tier2);
        assert_eq!(tier.push(vec![1, 2, 3]).unwrap(), 0);
        assert_eq!(tier.push(vec![4]).unwrap(), 1);
        assert_eq!(tier.push(vec![1, 2, 3]).unwrap(), 2);
        assert_eq!(tier.lookup(&[1, 2, 3]), Some(0));
        assert_eq!(tier.get(2), Some(&[1u8, 2, 3][..]));
        assert!(tier.push(vec![0; 33]).is_err());
        assert!(tier.push(Vec::new()).is_err());
    }

    #[test]
    fn tier_capacity() {
        let mut tier = DictionaryTier::new(Table::Tier1);
        for i in 0..32u8 {
            tier.push(vec![i]).unwrap();
        }
        let err = tier.push(vec![0xff]).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { max: 32, .. }));
    }

    #[test]
    fn sync_is_incremental_and_idempotent() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut registry = RegistrySnapshot::new(&expectations());
        registry.tier1 = vec![vec![0xaa; 20]];
        registry.tier2 = vec![vec![0xbb; 32], vec![0xcc; 4]];
        registry.function_selectors = vec![vec![0xa9, 0x05, 0x9c, 0xbb]];

        let mut store = DictionaryStore::new(expectations());
        let report = block_on(store.sync(&registry)).unwrap();
        assert_eq!(report.total(), 4);
        assert_eq!(store.lookup(&[0xaa; 20]), Some(DictRef::Tier1(0)));
        assert_eq!(store.lookup(&[0xcc; 4]), Some(DictRef::Tier2(1)));
        assert_eq!(store.selector_alias(&[0xa9, 0x05, 0x9c, 0xbb]), Some(0));

        let report = block_on(store.sync(&registry)).unwrap();
        assert_eq!(report.total(), 0);

        registry.tier3.push(vec![0xdd; 8]);
        let report = block_on(store.sync(&registry)).unwrap();
        assert_eq!(report, SyncReport { tier3: 1, ..Default::default() });
        assert_eq!(store.lookup(&[0xdd; 8]), Some(DictRef::Tier3(0)));
        assert_eq!(store.tier(Table::Tier2).len(), 2);
    }

    #[test]
    fn lookup_prefers_lower_tiers() {
        let mut registry = RegistrySnapshot::new(&expectations());
        registry.tier2 = vec![vec![7; 10]];
        registry.tier1 = vec![vec![7; 10]];
        let mut store = DictionaryStore::new(expectations());
        block_on(store.sync(&registry)).unwrap();
        assert_eq!(store.lookup(&[7; 10]), Some(DictRef::Tier1(0)));
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let mut registry = RegistrySnapshot::new(&expectations());
        registry.tier1 = vec![vec![1]];
        registry.compressor_version = 2;
        let mut store = DictionaryStore::new(expectations());
        let err = block_on(store.sync(&registry)).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { what: "compressor version", .. }));

        registry.compressor_version = 1;
        registry.target_contract = [0x22; 20];
        let err = block_on(store.sync(&registry)).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { what: "target contract", .. }));
        assert!(store.tier(Table::Tier1).is_empty());
    }

    #[test]
    fn failed_sync_leaves_store_untouched() {
        let mut registry = RegistrySnapshot::new(&expectations());
        registry.tier1 = vec![vec![1]];
        // Tier 2 entry is too large to ever be an element
        registry.tier2 = vec![vec![2; 40]];
        let mut store = DictionaryStore::new(expectations());
        assert!(block_on(store.sync(&registry)).is_err());
        assert!(store.tier(Table::Tier1).is_empty());
        assert!(store.resolve(Table::Tier1, 0).is_err());
    }
}
