use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex encoded SHA-256 digest usable as a cache key.
#[derive(Hash, Eq, PartialEq, Clone, Debug, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builds a composite fingerprint out of several parts.
///
/// Every part is length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// never collide.
#[derive(Clone, Default)]
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes
    pub fn bytes(mut self, part: &[u8]) -> Self {
        self.hasher.update((part.len() as u64).to_le_bytes());
        self.hasher.update(part);
        self
    }

    /// Feed a string slice
    pub fn str(self, part: &str) -> Self {
        self.bytes(part.as_bytes())
    }

    /// Feed the `Debug` representation of a value
    pub fn debug<T: fmt::Debug + ?Sized>(self, part: &T) -> Self {
        self.str(&format!("{:?}", part))
    }

    /// Feed the JSON encoding of a value
    pub fn json<T: Serialize + ?Sized>(self, part: &T) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_vec(part)?;
        Ok(self.bytes(&encoded))
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.hasher.finalize()))
    }
}

/// Structural key: two values with the same JSON encoding share a fingerprint.
///
/// Map key order follows the serializer, so `HashMap` fields make poor
/// candidates; prefer `BTreeMap` for those.
pub fn fingerprint_json<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint, serde_json::Error> {
    let fingerprint = FingerprintBuilder::new().json(value)?.finish();
    log::trace!("Computed json fingerprint {}", fingerprint);
    Ok(fingerprint)
}

/// Key derived from the `Debug` representation of a value.
pub fn fingerprint_debug<T: fmt::Debug + ?Sized>(value: &T) -> Fingerprint {
    FingerprintBuilder::new().debug(value).finish()
}
