// BigNumber - Large integer arithmetic wrapper over num-bigint
//
// All wire encodings in the SRP exchange are big-endian byte strings,
// optionally left-padded with zero bytes to the group size.

use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::rngs::OsRng;

/// Unsigned big integer used for the SRP group arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigNumber {
    bn: BigUint,
}

impl BigNumber {
    /// Create a new BigNumber initialized to zero
    pub fn new() -> Self {
        BigNumber { bn: BigUint::zero() }
    }

    /// Create from a u32 value
    pub fn from_u32(val: u32) -> Self {
        BigNumber { bn: BigUint::from(val) }
    }

    /// Create from big-endian bytes
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        BigNumber {
            bn: BigUint::from_bytes_be(bytes),
        }
    }

    /// Parse from a big-endian hex string
    pub fn from_hex_str(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.is_empty() {
            return None;
        }
        BigUint::parse_bytes(hex.as_bytes(), 16).map(|bn| BigNumber { bn })
    }

    /// Generate a random number with the specified number of bits,
    /// drawn from the operating system CSPRNG.
    pub fn random(num_bits: u64) -> Self {
        BigNumber {
            bn: OsRng.gen_biguint(num_bits),
        }
    }

    /// Check if the number is zero
    pub fn is_zero(&self) -> bool {
        self.bn.is_zero()
    }

    /// Modular exponentiation: self^exp mod modulus
    pub fn mod_exp(&self, exp: &BigNumber, modulus: &BigNumber) -> BigNumber {
        BigNumber {
            bn: self.bn.modpow(&exp.bn, &modulus.bn),
        }
    }

    /// Number of bytes in the minimal big-endian representation
    pub fn num_bytes(&self) -> usize {
        let bits = self.bn.bits() as usize;
        bits.div_ceil(8)
    }

    /// Minimal big-endian byte encoding (no leading zeros)
    pub fn to_bytes_be(&self) -> Vec<u8> {
        self.bn.to_bytes_be()
    }

    /// Big-endian byte encoding left-padded with zeros to at least min_size
    pub fn to_padded_bytes_be(&self, min_size: usize) -> Vec<u8> {
        let be_bytes = self.bn.to_bytes_be();
        if be_bytes.len() >= min_size {
            return be_bytes;
        }
        let mut result = vec![0u8; min_size];
        let offset = min_size - be_bytes.len();
        result[offset..].copy_from_slice(&be_bytes);
        result
    }

    /// Big-endian hex string (uppercase)
    pub fn to_hex_str(&self) -> String {
        if self.bn.is_zero() {
            return "0".to_string();
        }
        format!("{:X}", self.bn)
    }
}

impl Default for BigNumber {
    fn default() -> Self {
        Self::new()
    }
}

// Arithmetic operator implementations for the SRP equations

impl std::ops::Add for &BigNumber {
    type Output = BigNumber;
    fn add(self, rhs: &BigNumber) -> BigNumber {
        BigNumber {
            bn: &self.bn + &rhs.bn,
        }
    }
}

impl std::ops::Mul for &BigNumber {
    type Output = BigNumber;
    fn mul(self, rhs: &BigNumber) -> BigNumber {
        BigNumber {
            bn: &self.bn * &rhs.bn,
        }
    }
}

impl std::ops::Rem for &BigNumber {
    type Output = BigNumber;
    fn rem(self, rhs: &BigNumber) -> BigNumber {
        BigNumber {
            bn: &self.bn % &rhs.bn,
        }
    }
}
