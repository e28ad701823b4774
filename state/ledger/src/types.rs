//! Identity and reference types shared by every ledger component

use serde::{Deserialize, Serialize};

use cipherfolio_fhe::Ciphertext;

use crate::errors::{LedgerError, LedgerResult};

/// Milliseconds since the UNIX epoch
pub type Timestamp = u64;

/// Domain string for principals derived from labels
const PRINCIPAL_LABEL_DOMAIN: &str = "cipherfolio 2024-06 principal label";

/// Domain string for content addresses of ciphertexts
const HANDLE_DOMAIN: &str = "cipherfolio 2024-06 ciphertext handle";

fn parse_hex32(s: &str) -> LedgerResult<[u8; 32]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| LedgerError::Malformed(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| LedgerError::Malformed(format!("expected 32 bytes, got {}", bytes.len())))
}

/// An opaque identity owning a portfolio and holding capabilities
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal([u8; 32]);

impl Principal {
    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a principal from a human-readable label
    pub fn from_label(label: &str) -> Self {
        Self(blake3::derive_key(PRINCIPAL_LABEL_DOMAIN, label.as_bytes()))
    }

    /// The ledger's own identity, holder of computation grants
    pub const fn core() -> Self {
        Self([0u8; 32])
    }

    /// Whether this is the ledger's own identity
    pub fn is_core(&self) -> bool {
        *self == Self::core()
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex (optional 0x prefix)
    pub fn from_hex(s: &str) -> LedgerResult<Self> {
        parse_hex32(s).map(Self)
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Principal({})", self)
    }
}

/// Content address of a stored ciphertext
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CiphertextHandle([u8; 32]);

impl CiphertextHandle {
    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Content address of a ciphertext
    pub fn of(ciphertext: &Ciphertext) -> LedgerResult<Self> {
        let bytes = ciphertext.to_bytes()?;
        Ok(Self(blake3::derive_key(HANDLE_DOMAIN, &bytes)))
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex (optional 0x prefix)
    pub fn from_hex(s: &str) -> LedgerResult<Self> {
        parse_hex32(s).map(Self)
    }
}

impl std::fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ct:{}", hex::encode(&self.0[..8]))
    }
}

impl std::fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CiphertextHandle({})", hex::encode(&self.0[..8]))
    }
}

/// Permission recorded against a (handle, principal) pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// May feed the handle into homomorphic operations
    UseInComputation,
    /// May request decryption of the handle
    Decrypt,
}

impl Capability {
    /// All capabilities, in bit order
    pub const ALL: [Capability; 2] = [Capability::UseInComputation, Capability::Decrypt];

    fn bit(&self) -> u8 {
        match self {
            Capability::UseInComputation => 0b01,
            Capability::Decrypt => 0b10,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::UseInComputation => write!(f, "use-in-computation"),
            Capability::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// Set of capabilities held by one principal on one handle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// Add a capability; returns true if it was not present
    pub fn insert(&mut self, capability: Capability) -> bool {
        let had = self.contains(capability);
        self.0 |= capability.bit();
        !had
    }

    /// Remove a capability; returns true if it was present
    pub fn remove(&mut self, capability: Capability) -> bool {
        let had = self.contains(capability);
        self.0 &= !capability.bit();
        had
    }

    /// Check for a capability
    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Whether no capability is held
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of capabilities held
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate held capabilities
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

/// A recorded permission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessGrant {
    pub handle: CiphertextHandle,
    pub principal: Principal,
    pub capability: Capability,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_hex_roundtrip() {
        let p = Principal::from_label("alice");
        let back = Principal::from_hex(&p.to_hex()).unwrap();
        assert_eq!(p, back);
        assert_eq!(Principal::from_hex(&format!("0x{}", p.to_hex())).unwrap(), p);
    }

    #[test]
    fn test_principal_labels_differ() {
        assert_ne!(Principal::from_label("alice"), Principal::from_label("bob"));
        assert!(!Principal::from_label("alice").is_core());
        assert!(Principal::core().is_core());
    }

    #[test]
    fn test_bad_hex_is_malformed() {
        assert!(matches!(Principal::from_hex("zz"), Err(LedgerError::Malformed(_))));
        assert!(matches!(
            CiphertextHandle::from_hex("abcd"),
            Err(LedgerError::Malformed(_))
        ));
    }

    #[test]
    fn test_capability_set() {
        let mut set = CapabilitySet::default();
        assert!(set.is_empty());
        assert!(set.insert(Capability::Decrypt));
        assert!(!set.insert(Capability::Decrypt));
        assert!(set.contains(Capability::Decrypt));
        assert!(!set.contains(Capability::UseInComputation));
        assert_eq!(set.len(), 1);

        set.insert(Capability::UseInComputation);
        assert_eq!(set.iter().collect::<Vec<_>>(), Capability::ALL.to_vec());

        assert!(set.remove(Capability::Decrypt));
        assert!(!set.remove(Capability::Decrypt));
        assert_eq!(set.len(), 1);
    }
}
