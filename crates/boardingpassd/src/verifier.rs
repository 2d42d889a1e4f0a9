// VerifierProvider - device credential material
//
// Converts the static verifier spec plus the output of the device-unique
// password generator into the SRP verifier v, once per handshake. The
// password only ever exists in a zeroizing buffer and is wiped before the
// verifier is returned; nothing is cached, so a changed generator output
// fails authentication deterministically.

use std::path::{Path, PathBuf};
use std::time::Duration;

use data_encoding::BASE64;
use serde::Deserialize;
use tokio::process::Command;
use zeroize::Zeroize;

use boardingpass_shared::auth::{BigNumber, SecretBytes, Srp6};
use boardingpass_shared::log::REDACTED;

/// Minimum salt length in bytes
const MIN_SALT_LEN: usize = 16;

/// Maximum username length in characters
const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("verifier spec not found: {0}")]
    NotFound(PathBuf),
    #[error("verifier spec malformed: {0}")]
    Malformed(String),
    #[error("verifier spec salt invalid: {0}")]
    InvalidSalt(String),
    #[error("password generator missing: {0}")]
    GeneratorMissing(PathBuf),
    #[error("password generator failed: {0}")]
    GeneratorFailed(String),
    #[error("password generator produced empty output")]
    EmptyPassword,
}

/// On-disk JSON document, spec'd as exactly these three fields.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerifierSpec {
    username: String,
    salt: String,
    password_generator: String,
}

/// Validated verifier configuration.
#[derive(Debug, Clone)]
pub struct VerifierSpec {
    pub username: String,
    pub salt: Vec<u8>,
    pub generator: PathBuf,
}

impl VerifierSpec {
    /// Read and validate the verifier spec document.
    pub fn load(path: &Path) -> Result<Self, VerifierError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VerifierError::NotFound(path.to_path_buf())
            } else {
                VerifierError::Malformed(e.to_string())
            }
        })?;

        let raw: RawVerifierSpec =
            serde_json::from_str(&content).map_err(|e| VerifierError::Malformed(e.to_string()))?;

        if raw.username.is_empty() || raw.username.len() > MAX_USERNAME_LEN {
            return Err(VerifierError::Malformed(format!(
                "username must be 1..={} characters",
                MAX_USERNAME_LEN
            )));
        }
        if !raw.username.chars().all(|c| c.is_ascii_graphic()) {
            return Err(VerifierError::Malformed(
                "username must be printable ASCII".to_string(),
            ));
        }

        let salt = BASE64
            .decode(raw.salt.as_bytes())
            .map_err(|e| VerifierError::InvalidSalt(e.to_string()))?;
        if salt.len() < MIN_SALT_LEN {
            return Err(VerifierError::InvalidSalt(format!(
                "need at least {} bytes, got {}",
                MIN_SALT_LEN,
                salt.len()
            )));
        }

        let generator = PathBuf::from(&raw.password_generator);
        if !generator.is_absolute() {
            return Err(VerifierError::Malformed(
                "password_generator must be an absolute path".to_string(),
            ));
        }

        Ok(VerifierSpec {
            username: raw.username,
            salt,
            generator,
        })
    }
}

/// Produces the verifier on demand by running the generator program.
pub struct VerifierProvider {
    spec: VerifierSpec,
    /// Subprocess deadline; the generator is killed when it passes
    generator_deadline: Duration,
}

impl VerifierProvider {
    pub fn new(spec: VerifierSpec, generator_deadline: Duration) -> Self {
        VerifierProvider {
            spec,
            generator_deadline,
        }
    }

    pub fn spec(&self) -> &VerifierSpec {
        &self.spec
    }

    /// Run the generator and compute v = g^x mod N with
    /// x = SHA-256(salt || SHA-256(username ":" password)).
    pub async fn compute_verifier(&self, srp: &Srp6) -> Result<BigNumber, VerifierError> {
        let password = self.run_generator().await?;

        let x = Srp6::compute_x(&self.spec.salt, &self.spec.username, password.as_slice());
        let v = srp.compute_verifier(&x);
        drop(password);

        tracing::debug!(username = %self.spec.username, verifier = REDACTED, "verifier computed");
        Ok(v)
    }

    /// Execute the generator: no arguments, no stdin, stdout is the
    /// device-unique password with surrounding whitespace stripped.
    async fn run_generator(&self) -> Result<SecretBytes, VerifierError> {
        let child = Command::new(&self.spec.generator)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.generator_deadline, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VerifierError::GeneratorMissing(self.spec.generator.clone()));
            }
            Ok(Err(e)) => return Err(VerifierError::GeneratorFailed(e.to_string())),
            Err(_) => {
                return Err(VerifierError::GeneratorFailed(
                    "deadline exceeded".to_string(),
                ));
            }
        };

        if !output.status.success() {
            return Err(VerifierError::GeneratorFailed(format!(
                "exit status {}",
                output.status
            )));
        }

        let mut stdout = output.stdout;
        let trimmed = stdout.trim_ascii();
        if trimmed.is_empty() {
            stdout.zeroize();
            return Err(VerifierError::EmptyPassword);
        }

        let password = SecretBytes::new(trimmed.to_vec());
        stdout.zeroize();
        Ok(password)
    }
}
