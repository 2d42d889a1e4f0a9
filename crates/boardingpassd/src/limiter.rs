// AttemptLimiter - per-peer brute-force throttling
//
// Progressive delays for the first failures, a hard lockout from the
// fourth on. The limiter only advises: callers turn the returned delays
// into 429 responses, it never sleeps itself. A successful authentication
// clears the peer's record entirely.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Delay tiers for failures 1..=3
const TIER_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
];

/// Hard lockout applied from the fourth consecutive failure
const LOCKOUT: Duration = Duration::from_secs(60);

/// Records idle longer than this (and not locked) are swept
const DEFAULT_INACTIVITY_CUTOFF: Duration = Duration::from_secs(300);

/// Outcome of a pre-attempt check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    Allowed,
    Locked { retry_after: Duration },
}

#[derive(Debug)]
struct AttemptRecord {
    failure_count: u32,
    last_failed_at: Instant,
    locked_until: Option<Instant>,
}

/// Tracks failed authentication attempts per peer identifier. The peer id
/// is an opaque string; the daemon uses the source address.
pub struct AttemptLimiter {
    records: Mutex<HashMap<String, AttemptRecord>>,
    inactivity_cutoff: Duration,
}

impl AttemptLimiter {
    pub fn new() -> Self {
        AttemptLimiter {
            records: Mutex::new(HashMap::new()),
            inactivity_cutoff: DEFAULT_INACTIVITY_CUTOFF,
        }
    }

    /// Check whether the peer may attempt now. Does not mutate.
    ///
    /// Locked while a hard lockout is in force, and while the third
    /// failure's delay window is still open (a further failure inside it
    /// escalates to the hard lockout).
    pub fn check(&self, peer: &str) -> AttemptDecision {
        let records = self.records.lock();
        let Some(record) = records.get(peer) else {
            return AttemptDecision::Allowed;
        };

        let now = Instant::now();
        if let Some(until) = record.locked_until {
            if until > now {
                return AttemptDecision::Locked {
                    retry_after: until - now,
                };
            }
        }

        if record.failure_count >= 3 && record.locked_until.is_none() {
            let window_end = record.last_failed_at + TIER_DELAYS[2];
            if window_end > now {
                return AttemptDecision::Locked {
                    retry_after: window_end - now,
                };
            }
        }

        AttemptDecision::Allowed
    }

    /// Record a failed attempt and return the minimum wait before the
    /// next attempt will be accepted.
    pub fn on_failure(&self, peer: &str) -> Duration {
        let mut records = self.records.lock();
        let now = Instant::now();
        let record = records.entry(peer.to_string()).or_insert(AttemptRecord {
            failure_count: 0,
            last_failed_at: now,
            locked_until: None,
        });

        record.failure_count += 1;
        record.last_failed_at = now;

        if record.failure_count >= 4 {
            record.locked_until = Some(now + LOCKOUT);
            tracing::warn!(peer = %peer, failures = record.failure_count, "peer locked out");
            LOCKOUT
        } else {
            TIER_DELAYS[(record.failure_count - 1) as usize]
        }
    }

    /// Clear the peer's record after a successful authentication.
    pub fn on_success(&self, peer: &str) {
        self.records.lock().remove(peer);
    }

    /// Evict records idle past the cutoff that are not currently locked.
    pub fn sweep(&self) {
        let now = Instant::now();
        let cutoff = self.inactivity_cutoff;
        self.records.lock().retain(|_, record| {
            if let Some(until) = record.locked_until {
                if until > now {
                    return true;
                }
            }
            now.duration_since(record.last_failed_at) < cutoff
        });
    }

    #[cfg(test)]
    fn record_count(&self) -> usize {
        self.records.lock().len()
    }
}

impl Default for AttemptLimiter {
    fn default() -> Self {
        Self::new()
    }
}
