// SRP6 - Secure Remote Password protocol, version 6a
//
// Server side of the RFC 5054 handshake over the 2048-bit group with
// SHA-256. Wire encodings are minimal big-endian byte strings; padding to
// the group size applies only where the protocol says so (k and u).

use subtle::ConstantTimeEq;

use super::big_number::BigNumber;
use super::crypto_hash::{sha256, Sha256Hash};

/// RFC 5054 appendix A, 2048-bit group prime
const N_HEX: &str = "AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B855F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773BCA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB694B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73";

/// Generator for the 2048-bit group
const G: u32 = 2;

/// Group size in bytes (|N|)
pub const GROUP_BYTES: usize = 256;

/// Bit length of the server private ephemeral b
const EPHEMERAL_BITS: u64 = 256;

/// Bounded retry for the improbable B mod N == 0 draw
const EPHEMERAL_RETRIES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum Srp6Error {
    /// Client public ephemeral reduces to zero mod N
    #[error("invalid client public ephemeral")]
    InvalidPublicKey,
    /// Could not draw a usable server ephemeral
    #[error("server ephemeral generation failed")]
    EphemeralGeneration,
}

/// Server ephemeral pair for one handshake. The private half must only
/// ever be persisted through a zeroizing buffer.
pub struct ServerEphemeral {
    /// Private ephemeral b, minimal big-endian bytes
    pub private_bytes: Vec<u8>,
    /// Public ephemeral B = (k*v + g^b) mod N, minimal big-endian bytes
    pub public_bytes: Vec<u8>,
}

/// SRP-6a group parameters and server-side equations.
pub struct Srp6 {
    n: BigNumber,
    g: BigNumber,
    k: BigNumber,
}

impl Srp6 {
    pub fn new() -> Self {
        let n = BigNumber::from_hex_str(N_HEX).expect("group prime constant parses");
        let g = BigNumber::from_u32(G);

        // k = H(N || pad(g, |N|))
        let mut hash = Sha256Hash::new();
        hash.update_bytes(&n.to_bytes_be());
        hash.update_bytes(&g.to_padded_bytes_be(GROUP_BYTES));
        let k = BigNumber::from_bytes_be(&hash.finalize());

        Srp6 { n, g, k }
    }

    pub fn prime(&self) -> &BigNumber {
        &self.n
    }

    /// x = H(salt || H(username ":" password)), as an unsigned big integer
    pub fn compute_x(salt: &[u8], username: &str, password: &[u8]) -> BigNumber {
        let mut inner = Sha256Hash::new();
        inner.update_str(username).update_bytes(b":").update_bytes(password);
        let identity_hash = inner.finalize();

        let mut outer = Sha256Hash::new();
        outer.update_bytes(salt).update_bytes(&identity_hash);
        BigNumber::from_bytes_be(&outer.finalize())
    }

    /// v = g^x mod N
    pub fn compute_verifier(&self, x: &BigNumber) -> BigNumber {
        self.g.mod_exp(x, &self.n)
    }

    /// Reject client publics that reduce to zero mod N (covers A == 0)
    pub fn validate_client_public(&self, a: &BigNumber) -> Result<(), Srp6Error> {
        if (a % &self.n).is_zero() {
            return Err(Srp6Error::InvalidPublicKey);
        }
        Ok(())
    }

    /// Draw b and compute B = (k*v + g^b) mod N, regenerating on the
    /// astronomically unlikely B mod N == 0.
    pub fn generate_server_ephemeral(&self, v: &BigNumber) -> Result<ServerEphemeral, Srp6Error> {
        for _ in 0..EPHEMERAL_RETRIES {
            let b = BigNumber::random(EPHEMERAL_BITS);
            let g_b = self.g.mod_exp(&b, &self.n);
            let k_v = &(&self.k * v) % &self.n;
            let big_b = &(&k_v + &g_b) % &self.n;
            if big_b.is_zero() {
                continue;
            }
            return Ok(ServerEphemeral {
                private_bytes: b.to_bytes_be(),
                public_bytes: big_b.to_bytes_be(),
            });
        }
        Err(Srp6Error::EphemeralGeneration)
    }

    /// u = H(pad(A, |N|) || pad(B, |N|))
    pub fn compute_u(&self, a: &BigNumber, big_b: &BigNumber) -> BigNumber {
        let mut hash = Sha256Hash::new();
        hash.update_bytes(&a.to_padded_bytes_be(GROUP_BYTES));
        hash.update_bytes(&big_b.to_padded_bytes_be(GROUP_BYTES));
        BigNumber::from_bytes_be(&hash.finalize())
    }

    /// S = (A * v^u)^b mod N
    pub fn compute_session_secret(
        &self,
        a: &BigNumber,
        v: &BigNumber,
        u: &BigNumber,
        b: &BigNumber,
    ) -> BigNumber {
        let v_u = v.mod_exp(u, &self.n);
        let a_vu = &(a * &v_u) % &self.n;
        a_vu.mod_exp(b, &self.n)
    }

    /// K = H(be(S))
    pub fn session_key(s: &BigNumber) -> [u8; Sha256Hash::DIGEST_LENGTH] {
        sha256(&s.to_bytes_be())
    }

    /// M1 = H( (H(N) XOR H(g)) || H(username) || salt || A || B || K )
    ///
    /// A and B are the minimal big-endian encodings as exchanged on the
    /// wire, not re-padded to the group size.
    pub fn compute_m1(
        &self,
        username: &str,
        salt: &[u8],
        a_bytes: &[u8],
        b_bytes: &[u8],
        key: &[u8],
    ) -> [u8; Sha256Hash::DIGEST_LENGTH] {
        let h_n = sha256(&self.n.to_bytes_be());
        let h_g = sha256(&self.g.to_bytes_be());
        let mut xored = [0u8; Sha256Hash::DIGEST_LENGTH];
        for (i, out) in xored.iter_mut().enumerate() {
            *out = h_n[i] ^ h_g[i];
        }

        let identity_hash = sha256(username.as_bytes());

        let mut hash = Sha256Hash::new();
        hash.update_bytes(&xored)
            .update_bytes(&identity_hash)
            .update_bytes(salt)
            .update_bytes(a_bytes)
            .update_bytes(b_bytes)
            .update_bytes(key);
        hash.finalize()
    }

    /// M2 = H(A || M1 || K)
    pub fn compute_m2(
        a_bytes: &[u8],
        m1: &[u8],
        key: &[u8],
    ) -> [u8; Sha256Hash::DIGEST_LENGTH] {
        let mut hash = Sha256Hash::new();
        hash.update_bytes(a_bytes).update_bytes(m1).update_bytes(key);
        hash.finalize()
    }
}

impl Default for Srp6 {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant-time byte equality for proof comparison
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
