// HMAC-SHA256 wrapper used for session token signatures

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256Inner = Hmac<Sha256>;

/// HMAC-SHA256 streaming wrapper.
pub struct HmacSha256 {
    mac: HmacSha256Inner,
}

impl HmacSha256 {
    pub const DIGEST_LENGTH: usize = 32;

    /// Create a new HMAC-SHA256 with the given key
    pub fn new(key: &[u8]) -> Self {
        HmacSha256 {
            mac: HmacSha256Inner::new_from_slice(key)
                .expect("HMAC-SHA256 key can be any length"),
        }
    }

    /// Update with raw bytes
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.mac.update(data);
        self
    }

    /// Consume the MAC and return the tag
    pub fn finalize(self) -> [u8; Self::DIGEST_LENGTH] {
        let mut digest = [0u8; Self::DIGEST_LENGTH];
        digest.copy_from_slice(&self.mac.finalize().into_bytes());
        digest
    }
}

/// Compute HMAC-SHA256 in one shot
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HmacSha256::DIGEST_LENGTH] {
    let mut mac = HmacSha256::new(key);
    mac.update(data);
    mac.finalize()
}
