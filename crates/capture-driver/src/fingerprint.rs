use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Identity of a single call, derived from the owning function's stable name
/// and its argument. Two calls with the same fingerprint are, by contract,
/// the same call: the cache oracle is keyed on this value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes a fingerprint from a function identity and its (serializable)
    /// argument. Mirrors `cache::cache_key` in spirit (SHA-256 digest used as
    /// an opaque cache key) but hashes structured argument bytes rather than
    /// source text.
    pub fn compute<A: Serialize>(identity: &str, arg: &A) -> Result<Self> {
        let arg_bytes = postcard::to_allocvec(arg)
            .map_err(|e| Error::Serialization(format!("encoding call argument: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        hasher.update(b"\0");
        hasher.update(&arg_bytes);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Ok(Fingerprint(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..")
    }
}

/// A hashable, serialization-derived stand-in for a user's batch key. The
/// spec requires batch keys to be hashable; rather than type-erasing an
/// arbitrary `K: Hash` across unrelated `Parallelizable` instances, keys are
/// normalized to their postcard encoding, which is `Hash + Eq + Clone` for
/// any `K: Serialize`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BatchKeyBytes(Vec<u8>);

impl BatchKeyBytes {
    pub fn compute<K: Serialize>(key: &K) -> Result<Self> {
        postcard::to_allocvec(key)
            .map(BatchKeyBytes)
            .map_err(|e| Error::Contract(format!("batch key is not encodable: {e}")))
    }
}

impl std::fmt::Debug for BatchKeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BatchKeyBytes({} bytes)", self.0.len())
    }
}
