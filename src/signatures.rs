use std::collections::HashMap;
use std::sync::OnceLock;

use log::warn;

use crate::abi::Function;

/// Signatures every [`SignatureTable::builtin`] knows about.
pub const BUILTIN_SIGNATURES: &[&str] = &[
    // ERC-20
    "transfer(address,uint256)",
    "approve(address,uint256)",
    "transferFrom(address,address,uint256)",
    "balanceOf(address)",
    "allowance(address,address)",
    // ERC-721
    "safeTransferFrom(address,address,uint256)",
    "safeTransferFrom(address,address,uint256,bytes)",
    "setApprovalForAll(address,bool)",
    // Batching
    "multicall(bytes[])",
    "multicall(uint256,bytes[])",
    "aggregate((address,bytes)[])",
    "execute(address,uint256,bytes)",
    "executeBatch(address[],uint256[],bytes[])",
    // Intent solutions
    crate::solution::HANDLE_INTENTS_SIGNATURE,
];

/// Known function signatures, looked up by selector.
///
/// Signatures are kept as text and only parsed on the first lookup. Signatures that fail to
/// parse are logged and left out.
#[derive(Debug, Default)]
pub struct SignatureTable {
    signatures: Vec<String>,
    parsed: OnceLock<HashMap<[u8; 4], Function>>,
}

impl Clone for SignatureTable {
    fn clone(&self) -> Self {
        Self::new(self.signatures.clone())
    }
}

impl SignatureTable {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signatures: signatures.into_iter().map(Into::into).collect(),
            parsed: OnceLock::new(),
        }
    }

    /// The process-wide table of common token, batching and intent calls.
    pub fn builtin() -> &'static SignatureTable {
        static BUILTIN: OnceLock<SignatureTable> = OnceLock::new();
        BUILTIN.get_or_init(|| SignatureTable::new(BUILTIN_SIGNATURES.iter().copied()))
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    pub fn lookup(&self, selector: &[u8]) -> Option<&Function> {
        let selector: [u8; 4] = selector.try_into().ok()?;
        self.functions().get(&selector)
    }

    pub fn len(&self) -> usize {
        self.functions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions().is_empty()
    }

    fn functions(&self) -> &HashMap<[u8; 4], Function> {
        self.parsed.get_or_init(|| {
            let mut map = HashMap::with_capacity(self.signatures.len());
            for sig in &self.signatures {
                match Function::parse(sig) {
                    Ok(f) => {
                        map.entry(f.selector).or_insert(f);
                    }
                    Err(e) => warn!("Skipping signature {:?}: {}", sig, e),
                }
            }
            map
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let table = SignatureTable::builtin();
        assert_eq!(table.len(), BUILTIN_SIGNATURES.len());
        let f = table.lookup(&[0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        assert_eq!(f.name, "transfer");
        assert!(table.lookup(&[0, 0, 0, 0]).is_none());
        assert!(table.lookup(&[0xa9, 0x05, 0x9c]).is_none());
    }

    #[test]
    fn bad_signatures_are_skipped() {
        let table = SignatureTable::new(["balanceOf(address)", "nope(", "f(uint7)"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.signatures().len(), 3);
        assert!(table.lookup(&[0x70, 0xa0, 0x82, 0x31]).is_some());
    }

    #[test]
    fn clone_reparses() {
        let table = SignatureTable::new(["approve(address,uint256)"]);
        assert!(!table.is_empty());
        let copy = table.clone();
        assert!(copy.lookup(&[0x09, 0x5e, 0xa7, 0xb3]).is_some());
    }
}
