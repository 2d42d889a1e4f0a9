// SessionRegistry - HMAC-signed bearer tokens
//
// Tokens are `b64url(token_id) "." b64url(sig)` with
// sig = HMAC-SHA256(secret, token_id || username). The secret is drawn
// fresh at startup and held in a zeroizing buffer, so every token from a
// previous process is dead on arrival. Records are in-memory only.
//
// The registry keeps full records per token, so the lookup alone would
// authenticate; the HMAC comparison still runs on every validate as a
// second, key-bound check.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use data_encoding::BASE64URL_NOPAD;
use rand::RngCore;

use boardingpass_shared::auth::hmac::hmac_sha256;
use boardingpass_shared::auth::srp6::constant_time_eq;
use boardingpass_shared::auth::SecretBytes;

/// Random token identifier length in bytes
const TOKEN_ID_LEN: usize = 32;

/// HMAC secret length in bytes
const SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session expired")]
    Expired,
    #[error("session signature invalid")]
    SignatureInvalid,
    #[error("session limit exceeded")]
    LimitExceeded,
}

/// An issued session, handed to request handlers after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

struct SessionRecord {
    token_id: Vec<u8>,
    username: String,
    created_at: Instant,
    expires_at: Instant,
}

/// Mints, validates, and retires session tokens. Owns all records.
pub struct SessionRegistry {
    /// Per-startup HMAC key; regenerating it is what invalidates every
    /// token across restarts
    secret: SecretBytes,
    /// Configured operator identity, used to classify tokens that have
    /// no record (see validate)
    username: String,
    ttl: Duration,
    max_sessions: usize,
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new(username: &str, ttl: Duration, max_sessions: usize) -> Self {
        SessionRegistry {
            secret: SecretBytes::random(SECRET_LEN),
            username: username.to_string(),
            ttl,
            max_sessions,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sign(&self, token_id: &[u8], username: &str) -> [u8; 32] {
        let mut message = Vec::with_capacity(token_id.len() + username.len());
        message.extend_from_slice(token_id);
        message.extend_from_slice(username.as_bytes());
        hmac_sha256(self.secret.as_slice(), &message)
    }

    /// Mint a new token for the given username. Fails once the live-token
    /// cap is reached.
    pub fn create(&self, username: &str) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.lock();
        let now = Instant::now();

        // Expired records do not count against the cap
        sessions.retain(|_, record| record.expires_at > now);
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::LimitExceeded);
        }

        let mut token_id = vec![0u8; TOKEN_ID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut token_id);
        let sig = self.sign(&token_id, username);

        let token = format!(
            "{}.{}",
            BASE64URL_NOPAD.encode(&token_id),
            BASE64URL_NOPAD.encode(&sig)
        );

        let record = SessionRecord {
            token_id,
            username: username.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        let session = Session {
            token: token.clone(),
            username: record.username.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
        };
        sessions.insert(token, record);

        tracing::info!(username = %username, live = sessions.len(), "session issued");
        Ok(session)
    }

    /// Validate a presented token: record lookup, expiry, then the
    /// constant-time HMAC comparison over the parsed token_id and the
    /// recorded username.
    pub fn validate(&self, token: &str) -> Result<Session, SessionError> {
        let (token_id, sig) = parse_token(token).ok_or(SessionError::SignatureInvalid)?;

        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            Some(record) => {
                if record.expires_at <= Instant::now() {
                    sessions.remove(token);
                    return Err(SessionError::Expired);
                }
                let expected = self.sign(&record.token_id, &record.username);
                if !constant_time_eq(&expected, &sig) {
                    return Err(SessionError::SignatureInvalid);
                }
                Ok(Session {
                    token: token.to_string(),
                    username: record.username.clone(),
                    created_at: record.created_at,
                    expires_at: record.expires_at,
                })
            }
            None => {
                // Distinguish a forged or stale-secret token from one this
                // process signed but has since retired
                let expected = self.sign(&token_id, &self.username);
                if constant_time_eq(&expected, &sig) {
                    Err(SessionError::NotFound)
                } else {
                    Err(SessionError::SignatureInvalid)
                }
            }
        }
    }

    /// Remove a token record. Safe to call any number of times.
    pub fn invalidate(&self, token: &str) {
        self.sessions.lock().remove(token);
    }

    /// Drop expired records.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.sessions.lock().retain(|_, record| record.expires_at > now);
    }

    #[cfg(test)]
    fn live_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .lock()
            .values()
            .filter(|record| record.expires_at > now)
            .count()
    }
}

fn parse_token(token: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let (id_part, sig_part) = token.split_once('.')?;
    let token_id = BASE64URL_NOPAD.decode(id_part.as_bytes()).ok()?;
    let sig = BASE64URL_NOPAD.decode(sig_part.as_bytes()).ok()?;
    if token_id.len() != TOKEN_ID_LEN || sig.len() != 32 {
        return None;
    }
    Some((token_id, sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new("boardingpass", Duration::from_secs(1800), 10)
    }

    #[test]
    fn test_create_and_validate() {
        let registry = registry();
        let session = registry.create("boardingpass").unwrap();
        assert!(session.token.len() <= 128);

        let validated = registry.validate(&session.token).unwrap();
        assert_eq!(validated.username, "boardingpass");
    }

    #[test]
    fn test_token_grammar() {
        let registry = registry();
        let session = registry.create("boardingpass").unwrap();
        let (id_part, sig_part) = session.token.split_once('.').unwrap();
        assert_eq!(BASE64URL_NOPAD.decode(id_part.as_bytes()).unwrap().len(), 32);
        assert_eq!(BASE64URL_NOPAD.decode(sig_part.as_bytes()).unwrap().len(), 32);
    }

    #[test]
    fn test_foreign_secret_rejected_as_signature_invalid() {
        let r1 = registry();
        let token = r1.create("boardingpass").unwrap().token;
        drop(r1);

        let r2 = registry();
        assert_eq!(r2.validate(&token), Err(SessionError::SignatureInvalid));
    }

    #[test]
    fn test_invalidate_idempotent() {
        let registry = registry();
        let token = registry.create("boardingpass").unwrap().token;
        registry.invalidate(&token);
        registry.invalidate(&token);
        registry.invalidate(&token);
        // Properly signed but retired
        assert_eq!(registry.validate(&token), Err(SessionError::NotFound));
    }

    #[test]
    fn test_session_cap() {
        let registry = SessionRegistry::new("boardingpass", Duration::from_secs(1800), 3);
        let mut tokens = Vec::new();
        for _ in 0..3 {
            tokens.push(registry.create("boardingpass").unwrap().token);
        }
        assert_eq!(
            registry.create("boardingpass").unwrap_err(),
            SessionError::LimitExceeded
        );

        // Retiring one frees a slot
        registry.invalidate(&tokens[0]);
        assert!(registry.create("boardingpass").is_ok());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let registry = registry();
        assert_eq!(
            registry.validate("not-a-token"),
            Err(SessionError::SignatureInvalid)
        );
        assert_eq!(
            registry.validate("a.b"),
            Err(SessionError::SignatureInvalid)
        );
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let registry = registry();
        let token = registry.create("boardingpass").unwrap().token;
        let (id_part, _) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", id_part, BASE64URL_NOPAD.encode(&[0u8; 32]));
        assert_eq!(
            registry.validate(&forged),
            Err(SessionError::SignatureInvalid)
        );
    }

    #[test]
    fn test_expired_session() {
        let registry = SessionRegistry::new("boardingpass", Duration::from_secs(0), 10);
        let token = registry.create("boardingpass").unwrap().token;
        assert_eq!(registry.validate(&token), Err(SessionError::Expired));
    }

    #[test]
    fn test_sweep_drops_expired() {
        let registry = SessionRegistry::new("boardingpass", Duration::from_secs(0), 10);
        let _ = registry.create("boardingpass").unwrap();
        registry.sweep();
        assert_eq!(registry.live_count(), 0);
    }
}
