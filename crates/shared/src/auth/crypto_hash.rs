// CryptoHash - SHA-256 hash wrapper
//
// Streaming wrapper used by the SRP proof equations, which hash mixed
// sequences of byte strings and big-number encodings.

use super::big_number::BigNumber;
use digest::Digest;
use sha2::Sha256;

/// SHA-256 streaming hasher.
pub struct Sha256Hash {
    hasher: Sha256,
}

impl Sha256Hash {
    pub const DIGEST_LENGTH: usize = 32;

    pub fn new() -> Self {
        Sha256Hash {
            hasher: Sha256::new(),
        }
    }

    /// Update with raw bytes
    pub fn update_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    /// Update with a string
    pub fn update_str(&mut self, data: &str) -> &mut Self {
        self.hasher.update(data.as_bytes());
        self
    }

    /// Update with the minimal big-endian encoding of a BigNumber
    pub fn update_big_number(&mut self, bn: &BigNumber) -> &mut Self {
        self.hasher.update(bn.to_bytes_be());
        self
    }

    /// Consume the hasher and return the digest
    pub fn finalize(self) -> [u8; Self::DIGEST_LENGTH] {
        let mut digest = [0u8; Self::DIGEST_LENGTH];
        digest.copy_from_slice(&self.hasher.finalize());
        digest
    }
}

impl Default for Sha256Hash {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute SHA-256 over a single byte string in one shot
pub fn sha256(data: &[u8]) -> [u8; Sha256Hash::DIGEST_LENGTH] {
    let mut hash = Sha256Hash::new();
    hash.update_bytes(data);
    hash.finalize()
}
