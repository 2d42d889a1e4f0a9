// Auth module - cryptographic primitives and the SRP-6a protocol

pub mod big_number;
pub mod crypto_hash;
pub mod hmac;
pub mod secret;
pub mod srp6;

pub use big_number::BigNumber;
pub use crypto_hash::Sha256Hash;
pub use hmac::HmacSha256;
pub use secret::SecretBytes;
pub use srp6::Srp6;
