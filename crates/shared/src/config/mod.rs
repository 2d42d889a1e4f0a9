// Configuration module
// Reads INI-style configuration files with environment variable overrides.
// Durations carry documented floors; out-of-range values are silently
// raised rather than rejected.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::{
    DEFAULT_DRAIN_GRACE_SECS, DEFAULT_HANDSHAKE_TTL_SECS, DEFAULT_INACTIVITY_TIMEOUT_SECS,
    DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECS, MIN_HANDSHAKE_TTL_SECS,
    MIN_INACTIVITY_TIMEOUT_SECS, MIN_SESSION_TTL_SECS,
};

/// Global configuration singleton
static CONFIG: once_cell::sync::Lazy<Mutex<Config>> =
    once_cell::sync::Lazy::new(|| Mutex::new(Config::new()));

/// Get a reference to the global config instance
pub fn get_config() -> &'static Mutex<Config> {
    &CONFIG
}

/// Configuration file parser.
/// Supports INI-style files with environment variable override.
pub struct Config {
    values: HashMap<String, String>,
    filename: String,
    env_prefix: String,
}

impl Config {
    pub fn new() -> Self {
        Config {
            values: HashMap::new(),
            filename: String::new(),
            env_prefix: String::new(),
        }
    }

    /// Load configuration from a file.
    /// env_prefix is used to check environment variables (e.g., "Boardingpass_")
    pub fn set_source(&mut self, filename: &str, env_prefix: &str) -> bool {
        self.filename = filename.to_string();
        self.env_prefix = env_prefix.to_string();
        self.reload()
    }

    /// Reload the configuration file
    pub fn reload(&mut self) -> bool {
        self.values.clear();

        let path = Path::new(&self.filename);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return false,
        };

        for line in content.lines() {
            let trimmed = line.trim();

            // Skip empty lines and comments
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // Skip section headers [Section]
            if trimmed.starts_with('[') {
                continue;
            }

            // Parse key = value
            if let Some(eq_pos) = trimmed.find('=') {
                let key = trimmed[..eq_pos].trim().to_string();
                let mut value = trimmed[eq_pos + 1..].trim().to_string();

                // Strip quotes
                if value.starts_with('"') && value.ends_with('"') {
                    value = value[1..value.len() - 1].to_string();
                }

                self.values.insert(key, value);
            }
        }

        true
    }

    /// Get a string value with a default
    pub fn get_string_default(&self, key: &str, default: &str) -> String {
        self.get_env_or_config(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Get a string value (empty string default)
    pub fn get_string(&self, key: &str) -> String {
        self.get_string_default(key, "")
    }

    /// Get an integer value with a default
    pub fn get_int_default(&self, key: &str, default: i64) -> i64 {
        match self.get_env_or_config(key) {
            Some(val) => val.parse().unwrap_or(default),
            None => default,
        }
    }

    /// Get a duration in seconds, clamped below at `floor_secs`
    fn get_duration_floored(&self, key: &str, default_secs: u64, floor_secs: u64) -> Duration {
        let raw = self.get_int_default(key, default_secs as i64).max(0) as u64;
        Duration::from_secs(raw.max(floor_secs))
    }

    /// Try environment variable first, then config file
    fn get_env_or_config(&self, key: &str) -> Option<String> {
        // Convert key to env var name: replace '.' with '_', add prefix
        if !self.env_prefix.is_empty() {
            let env_key = format!("{}{}", self.env_prefix, key.replace('.', "_"));
            if let Ok(val) = std::env::var(&env_key) {
                return Some(val);
            }
        }

        self.values.get(key).cloned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Service settings resolved from the raw key/value store.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub bind_ip: String,
    pub port: u16,
    pub verifier_file: String,
    pub sentinel_file: String,
    pub handshake_ttl: Duration,
    pub session_ttl: Duration,
    pub max_sessions: usize,
    pub inactivity_timeout: Duration,
    pub drain_grace: Duration,
    pub logs_dir: Option<String>,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        let logs_dir = config.get_string("LogsDir");
        ServiceSettings {
            bind_ip: config.get_string_default("BindIP", "0.0.0.0"),
            port: config.get_int_default("Port", 8443) as u16,
            verifier_file: config
                .get_string_default("VerifierFile", "/etc/boardingpass/verifier.json"),
            sentinel_file: config.get_string_default("SentinelFile", "/etc/boardingpass/issued"),
            handshake_ttl: config.get_duration_floored(
                "HandshakeTTL",
                DEFAULT_HANDSHAKE_TTL_SECS,
                MIN_HANDSHAKE_TTL_SECS,
            ),
            session_ttl: config.get_duration_floored(
                "SessionTTL",
                DEFAULT_SESSION_TTL_SECS,
                MIN_SESSION_TTL_SECS,
            ),
            max_sessions: config
                .get_int_default("MaxSessions", DEFAULT_MAX_SESSIONS as i64)
                .max(1) as usize,
            inactivity_timeout: config.get_duration_floored(
                "InactivityTimeout",
                DEFAULT_INACTIVITY_TIMEOUT_SECS,
                MIN_INACTIVITY_TIMEOUT_SECS,
            ),
            drain_grace: Duration::from_secs(
                config
                    .get_int_default("DrainGrace", DEFAULT_DRAIN_GRACE_SECS as i64)
                    .max(0) as u64,
            ),
            logs_dir: if logs_dir.is_empty() { None } else { Some(logs_dir) },
        }
    }
}
