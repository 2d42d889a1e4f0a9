// HandshakeEngine - SRP-6a server handshake orchestration
//
// One handshake lives from `init` to the first `verify` against its
// session id, or to TTL expiry, whichever comes first. The store removes
// unconditionally on take, so a given id can be verified at most once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use data_encoding::BASE64URL_NOPAD;
use rand::RngCore;
use zeroize::Zeroizing;

use boardingpass_shared::auth::srp6::constant_time_eq;
use boardingpass_shared::auth::{BigNumber, SecretBytes, Srp6};
use boardingpass_shared::log::REDACTED;

use crate::limiter::AttemptLimiter;
use crate::session::{Session, SessionError, SessionRegistry};
use crate::verifier::VerifierProvider;

/// Session identifier length in bytes (128 bits)
const SESSION_ID_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Client public ephemeral failed the mod-N check
    #[error("invalid handshake parameter")]
    InvalidParameter,
    /// Unknown or expired session id; never counted against the peer
    #[error("handshake session not found")]
    SessionNotFound,
    /// Client proof did not match
    #[error("client proof mismatch")]
    ProofMismatch,
    /// Live session cap reached
    #[error("session limit reached")]
    SessionLimit,
    /// Verifier computation or ephemeral generation failed
    #[error("internal handshake failure")]
    Internal,
}

/// In-flight handshake state. The server private ephemeral is the only
/// long-lived secret and sits in a zeroizing buffer.
pub struct HandshakeState {
    pub username: String,
    pub salt: Vec<u8>,
    pub verifier: BigNumber,
    /// b, minimal big-endian bytes
    pub server_private: SecretBytes,
    /// A exactly as received on the wire
    pub client_public: Vec<u8>,
    /// B exactly as sent on the wire
    pub server_public: Vec<u8>,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// Thread-safe map session_id -> HandshakeState with TTL and one-shot
/// take semantics.
pub struct HandshakeStore {
    entries: Mutex<HashMap<String, HandshakeState>>,
    ttl: Duration,
}

impl HandshakeStore {
    pub fn new(ttl: Duration) -> Self {
        HandshakeStore {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert a state under a fresh 128-bit random id.
    pub fn put(&self, state: HandshakeState) -> String {
        let mut entries = self.entries.lock();
        loop {
            let mut raw = [0u8; SESSION_ID_LEN];
            rand::rngs::OsRng.fill_bytes(&mut raw);
            let id = BASE64URL_NOPAD.encode(&raw);
            // Collision is vanishingly improbable; draw again if it happens
            if entries.contains_key(&id) {
                continue;
            }
            entries.insert(id.clone(), state);
            return id;
        }
    }

    /// Atomically remove and return the state. Expired entries are
    /// removed and reported as absent.
    pub fn take(&self, session_id: &str) -> Option<HandshakeState> {
        let state = self.entries.lock().remove(session_id)?;
        if state.expires_at <= Instant::now() {
            return None;
        }
        Some(state)
    }

    /// Drop expired entries.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, state| state.expires_at > now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Successful `init` outcome: the challenge returned to the client.
#[derive(Debug)]
pub struct HandshakeChallenge {
    pub session_id: String,
    pub salt: Vec<u8>,
    /// B, minimal big-endian bytes as placed on the wire
    pub server_public: Vec<u8>,
}

/// Successful `verify` outcome: the server proof plus the issued session.
#[derive(Debug)]
pub struct HandshakeProof {
    pub m2: Vec<u8>,
    pub session: Session,
}

/// Drives the SRP-6a server state machine and reports outcomes to the
/// attempt limiter.
pub struct HandshakeEngine {
    srp: Srp6,
    store: HandshakeStore,
    provider: VerifierProvider,
    sessions: Arc<SessionRegistry>,
    limiter: Arc<AttemptLimiter>,
}

impl HandshakeEngine {
    pub fn new(
        store: HandshakeStore,
        provider: VerifierProvider,
        sessions: Arc<SessionRegistry>,
        limiter: Arc<AttemptLimiter>,
    ) -> Self {
        HandshakeEngine {
            srp: Srp6::new(),
            store,
            provider,
            sessions,
            limiter,
        }
    }

    pub fn store(&self) -> &HandshakeStore {
        &self.store
    }

    /// Start a handshake: validate A, derive the verifier, and answer
    /// with the challenge.
    ///
    /// The requested username is bound into the proof computation but
    /// deliberately not compared against the configured identity here; a
    /// mismatch surfaces as a proof failure at verify, so the endpoint
    /// does not leak which usernames exist.
    pub async fn init(
        &self,
        username_requested: &str,
        a_bytes: &[u8],
        peer: &str,
    ) -> Result<HandshakeChallenge, HandshakeError> {
        let a = BigNumber::from_bytes_be(a_bytes);
        if self.srp.validate_client_public(&a).is_err() {
            tracing::warn!(peer = %peer, "handshake init with invalid client ephemeral");
            self.limiter.on_failure(peer);
            return Err(HandshakeError::InvalidParameter);
        }

        let verifier = self.provider.compute_verifier(&self.srp).await.map_err(|e| {
            tracing::error!(error = %e, "verifier computation failed");
            HandshakeError::Internal
        })?;

        let ephemeral = self.srp.generate_server_ephemeral(&verifier).map_err(|e| {
            tracing::error!(error = %e, "server ephemeral generation failed");
            HandshakeError::Internal
        })?;

        let spec = self.provider.spec();
        let salt = spec.salt.clone();
        let now = Instant::now();
        let state = HandshakeState {
            username: username_requested.to_string(),
            salt: salt.clone(),
            verifier,
            server_private: SecretBytes::new(ephemeral.private_bytes),
            client_public: a_bytes.to_vec(),
            server_public: ephemeral.public_bytes.clone(),
            created_at: now,
            expires_at: now + self.store.ttl(),
        };
        let session_id = self.store.put(state);

        tracing::info!(peer = %peer, session_id = %session_id, salt = REDACTED, "handshake initiated");
        Ok(HandshakeChallenge {
            session_id,
            salt,
            server_public: ephemeral.public_bytes,
        })
    }

    /// Finish a handshake: recompute the shared key, check the client
    /// proof in constant time, and on success mint a session token.
    ///
    /// The state is removed before any checking, so a replayed id fails
    /// with SessionNotFound no matter what happened the first time.
    pub fn verify(
        &self,
        session_id: &str,
        m1_bytes: &[u8],
        peer: &str,
    ) -> Result<HandshakeProof, HandshakeError> {
        let state = self.store.take(session_id).ok_or_else(|| {
            tracing::debug!(peer = %peer, "verify for unknown or expired handshake");
            HandshakeError::SessionNotFound
        })?;

        let a = BigNumber::from_bytes_be(&state.client_public);
        let big_b = BigNumber::from_bytes_be(&state.server_public);
        let b = BigNumber::from_bytes_be(state.server_private.as_slice());

        let u = self.srp.compute_u(&a, &big_b);
        let s = self.srp.compute_session_secret(&a, &state.verifier, &u, &b);
        let key = Zeroizing::new(Srp6::session_key(&s));

        let expected_m1 = Zeroizing::new(self.srp.compute_m1(
            &state.username,
            &state.salt,
            &state.client_public,
            &state.server_public,
            key.as_ref(),
        ));

        if !constant_time_eq(expected_m1.as_ref(), m1_bytes) {
            tracing::warn!(peer = %peer, username = %state.username, "client proof rejected");
            self.limiter.on_failure(peer);
            return Err(HandshakeError::ProofMismatch);
        }

        let m2 = Srp6::compute_m2(&state.client_public, m1_bytes, key.as_ref());

        let session = self.sessions.create(&state.username).map_err(|e| match e {
            SessionError::LimitExceeded => HandshakeError::SessionLimit,
            _ => HandshakeError::Internal,
        })?;
        self.limiter.on_success(peer);

        tracing::info!(
            peer = %peer,
            username = %state.username,
            handshake_ms = state.created_at.elapsed().as_millis() as u64,
            "operator authenticated"
        );
        Ok(HandshakeProof {
            m2: m2.to_vec(),
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_dir, write_generator, SrpTestClient, A_PRIVATE_HEX};
    use crate::verifier::VerifierSpec;

    fn engine_with_password(tag: &str, password: &str) -> HandshakeEngine {
        let dir = test_dir(&format!("handshake-{}", tag));
        let generator = write_generator(&dir, password);

        let spec = VerifierSpec {
            username: "boardingpass".to_string(),
            salt: (0u8..16).collect(),
            generator,
        };
        let provider = VerifierProvider::new(spec, Duration::from_secs(5));
        HandshakeEngine::new(
            HandshakeStore::new(Duration::from_secs(300)),
            provider,
            Arc::new(SessionRegistry::new(
                "boardingpass",
                Duration::from_secs(1800),
                10,
            )),
            Arc::new(AttemptLimiter::new()),
        )
    }

    #[tokio::test]
    async fn test_full_handshake_round_trip() {
        let engine = engine_with_password("happy", "hunter2");
        let client = SrpTestClient::new(A_PRIVATE_HEX);

        let challenge = engine
            .init("boardingpass", &client.a_pub_bytes, "10.0.0.2")
            .await
            .unwrap();
        assert_eq!(challenge.salt, (0u8..16).collect::<Vec<u8>>());
        assert!(!challenge.server_public.is_empty());

        let (m1, key) = client.proof(
            "boardingpass",
            b"hunter2",
            &challenge.salt,
            &challenge.server_public,
        );
        let proof = engine.verify(&challenge.session_id, &m1, "10.0.0.2").unwrap();

        assert!(client.accepts_server_proof(&proof.m2, &m1, &key));
        assert_eq!(proof.session.username, "boardingpass");
    }

    #[tokio::test]
    async fn test_wrong_password_fails_and_counts() {
        let engine = engine_with_password("wrongpw", "hunter3");
        let client = SrpTestClient::new(A_PRIVATE_HEX);

        let challenge = engine
            .init("boardingpass", &client.a_pub_bytes, "10.0.0.3")
            .await
            .unwrap();
        let (m1, _) = client.proof(
            "boardingpass",
            b"hunter2",
            &challenge.salt,
            &challenge.server_public,
        );
        let err = engine.verify(&challenge.session_id, &m1, "10.0.0.3").unwrap_err();
        assert!(matches!(err, HandshakeError::ProofMismatch));
        assert_eq!(
            engine.limiter.on_failure("10.0.0.3"),
            Duration::from_secs(2),
            "proof mismatch already consumed tier 1"
        );
    }

    #[tokio::test]
    async fn test_verify_is_one_shot() {
        let engine = engine_with_password("oneshot", "hunter2");
        let client = SrpTestClient::new(A_PRIVATE_HEX);

        let challenge = engine
            .init("boardingpass", &client.a_pub_bytes, "10.0.0.4")
            .await
            .unwrap();
        let (m1, _) = client.proof(
            "boardingpass",
            b"hunter2",
            &challenge.salt,
            &challenge.server_public,
        );
        engine.verify(&challenge.session_id, &m1, "10.0.0.4").unwrap();

        let err = engine.verify(&challenge.session_id, &m1, "10.0.0.4").unwrap_err();
        assert!(matches!(err, HandshakeError::SessionNotFound));
        // Replays are not counted as failures
        assert_eq!(engine.limiter.check("10.0.0.4"), crate::limiter::AttemptDecision::Allowed);
    }

    #[tokio::test]
    async fn test_unknown_username_fails_only_at_verify() {
        let engine = engine_with_password("enum", "hunter2");
        let client = SrpTestClient::new(A_PRIVATE_HEX);

        // init answers a normal-looking challenge for any identity
        let challenge = engine
            .init("intruder", &client.a_pub_bytes, "10.0.0.6")
            .await
            .unwrap();

        let (m1, _) = client.proof("intruder", b"hunter2", &challenge.salt, &challenge.server_public);
        let err = engine.verify(&challenge.session_id, &m1, "10.0.0.6").unwrap_err();
        assert!(matches!(err, HandshakeError::ProofMismatch));
    }

    #[tokio::test]
    async fn test_invalid_client_public_rejected() {
        let engine = engine_with_password("bada", "hunter2");

        // A == 0 and A == N both reduce to zero mod N
        let zero = [0u8; 4];
        let err = engine.init("boardingpass", &zero, "10.0.0.5").await.unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidParameter));

        let n_bytes = SrpTestClient::new(A_PRIVATE_HEX).prime_bytes();
        let err = engine.init("boardingpass", &n_bytes, "10.0.0.5").await.unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidParameter));
    }

    #[test]
    fn test_store_take_removes_expired() {
        let store = HandshakeStore::new(Duration::from_secs(0));
        let state = HandshakeState {
            username: "u".to_string(),
            salt: vec![0; 16],
            verifier: BigNumber::from_u32(7),
            server_private: SecretBytes::new(vec![1; 32]),
            client_public: vec![2; 4],
            server_public: vec![3; 4],
            created_at: Instant::now(),
            expires_at: Instant::now(),
        };
        let id = store.put(state);
        assert!(store.take(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_sweep() {
        let store = HandshakeStore::new(Duration::from_secs(0));
        for i in 0..4 {
            store.put(HandshakeState {
                username: format!("u{}", i),
                salt: vec![0; 16],
                verifier: BigNumber::from_u32(7),
                server_private: SecretBytes::new(vec![1; 32]),
                client_public: vec![2; 4],
                server_public: vec![3; 4],
                created_at: Instant::now(),
                expires_at: Instant::now(),
            });
        }
        assert_eq!(store.len(), 4);
        store.sweep();
        assert!(store.is_empty());
    }
}
