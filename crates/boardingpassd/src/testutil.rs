// Test support: an RFC 5054 client and fixture helpers
//
// The daemon only ever implements the server side; tests drive it with
// this client implementation of the same group and hash.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const N_HEX: &str = "AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B855F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773BCA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB694B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73";

/// A nonzero 256-bit client private ephemeral used across scenarios
pub const A_PRIVATE_HEX: &str =
    "0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF00000000DEADBEEF";

fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

fn pad_to(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

/// RFC 5054 client math (2048-bit group, SHA-256).
pub struct SrpTestClient {
    n: BigUint,
    g: BigUint,
    k: BigUint,
    a: BigUint,
    pub a_pub_bytes: Vec<u8>,
}

impl SrpTestClient {
    pub fn new(a_private_hex: &str) -> Self {
        let n = BigUint::parse_bytes(N_HEX.as_bytes(), 16).unwrap();
        let g = BigUint::from(2u32);

        // k = H(N || pad(g, |N|))
        let mut k_input = n.to_bytes_be();
        k_input.extend_from_slice(&pad_to(&[2u8], 256));
        let k = BigUint::from_bytes_be(&sha256(&k_input));

        let a = BigUint::parse_bytes(a_private_hex.as_bytes(), 16).unwrap();
        let a_pub = g.modpow(&a, &n);
        let a_pub_bytes = a_pub.to_bytes_be();
        SrpTestClient {
            n,
            g,
            k,
            a,
            a_pub_bytes,
        }
    }

    /// Compute the client proof M1 and session key K for a challenge.
    pub fn proof(
        &self,
        username: &str,
        password: &[u8],
        salt: &[u8],
        b_bytes: &[u8],
    ) -> (Vec<u8>, Vec<u8>) {
        let big_b = BigUint::from_bytes_be(b_bytes);

        // x = H(s || H(I ":" P))
        let mut inner = Vec::new();
        inner.extend_from_slice(username.as_bytes());
        inner.push(b':');
        inner.extend_from_slice(password);
        let inner_hash = sha256(&inner);
        let mut x_input = salt.to_vec();
        x_input.extend_from_slice(&inner_hash);
        let x = BigUint::from_bytes_be(&sha256(&x_input));

        // u = H(pad(A) || pad(B))
        let mut u_input = pad_to(&self.a_pub_bytes, 256);
        u_input.extend_from_slice(&pad_to(b_bytes, 256));
        let u = BigUint::from_bytes_be(&sha256(&u_input));

        // S = (B - k*g^x)^(a + u*x) mod N; g^x < N keeps it unsigned
        let g_x = self.g.modpow(&x, &self.n);
        let base = (&big_b + &self.k * ((&self.n - &g_x) % &self.n)) % &self.n;
        let exp = &self.a + &u * &x;
        let s = base.modpow(&exp, &self.n);
        let key = sha256(&s.to_bytes_be());

        // M1 = H((H(N) xor H(g)) || H(I) || s || A || B || K)
        let h_n = sha256(&self.n.to_bytes_be());
        let h_g = sha256(&[2u8]);
        let xored: Vec<u8> = h_n.iter().zip(h_g.iter()).map(|(x, y)| x ^ y).collect();
        let h_i = sha256(username.as_bytes());

        let mut m1_input = xored;
        m1_input.extend_from_slice(&h_i);
        m1_input.extend_from_slice(salt);
        m1_input.extend_from_slice(&self.a_pub_bytes);
        m1_input.extend_from_slice(b_bytes);
        m1_input.extend_from_slice(&key);
        let m1 = sha256(&m1_input);

        (m1, key)
    }

    /// Check the server proof M2 = H(A || M1 || K).
    pub fn accepts_server_proof(&self, m2: &[u8], m1: &[u8], key: &[u8]) -> bool {
        let mut input = self.a_pub_bytes.clone();
        input.extend_from_slice(m1);
        input.extend_from_slice(key);
        sha256(&input) == m2
    }

    /// N as big-endian bytes, for boundary-input tests
    pub fn prime_bytes(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }
}

/// Fresh scratch directory under the system temp dir.
pub fn test_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("boardingpassd-test-{}", tag));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write an executable generator script that prints the given password.
pub fn write_generator(dir: &Path, password: &str) -> PathBuf {
    let path = dir.join("pwgen.sh");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh\necho '{}'", password).unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
