use crate::dictionary::DictionaryStore;
use crate::registry::{RegistryExpectations, RegistrySnapshot};

pub(crate) fn expectations() -> RegistryExpectations {
    RegistryExpectations::new(1, [0u8; 20])
}

/// A store synced from a snapshot holding the given tier entries.
pub(crate) fn store_with(tier1: &[&[u8]], tier2: &[&[u8]], tier3: &[&[u8]]) -> DictionaryStore {
    let mut registry = RegistrySnapshot::new(&expectations());
    registry.tier1 = tier1.iter().map(|v| v.to_vec()).collect();
    registry.tier2 = tier2.iter().map(|v| v.to_vec()).collect();
    registry.tier3 = tier3.iter().map(|v| v.to_vec()).collect();
    let mut store = DictionaryStore::new(expectations());
    futures_executor::block_on(store.sync(&registry)).unwrap();
    store
}
