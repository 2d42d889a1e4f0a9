// LifecycleController - keeps the service running exactly while needed
//
// Owns the sentinel gate, the idle timer, the complete signal, and the
// drain sequence. Signal handling lives here and nowhere else; every
// other component observes only the cancellation token.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why the service began draining. First cause wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    Inactivity,
    Complete,
    Signal,
}

impl std::fmt::Display for DrainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrainReason::Inactivity => f.write_str("inactivity"),
            DrainReason::Complete => f.write_str("complete"),
            DrainReason::Signal => f.write_str("signal"),
        }
    }
}

pub struct LifecycleController {
    sentinel_path: PathBuf,
    inactivity_timeout: Duration,
    drain_grace: Duration,
    deadline: Mutex<Instant>,
    drain_reason: Mutex<Option<DrainReason>>,
    cancel: CancellationToken,
}

impl LifecycleController {
    pub fn new(
        sentinel_path: PathBuf,
        inactivity_timeout: Duration,
        drain_grace: Duration,
    ) -> Self {
        LifecycleController {
            sentinel_path,
            inactivity_timeout,
            drain_grace,
            deadline: Mutex::new(Instant::now() + inactivity_timeout),
            drain_reason: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Whether the sentinel already exists. Checked before any socket is
    /// opened; presence means the device is provisioned and the service
    /// has nothing left to do.
    pub fn sentinel_present(path: &Path) -> bool {
        path.exists()
    }

    pub fn drain_grace(&self) -> Duration {
        self.drain_grace
    }

    /// Cancellation signal observed by the HTTP acceptor and all sweepers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn drain_reason(&self) -> Option<DrainReason> {
        *self.drain_reason.lock()
    }

    /// Push the idle deadline out. Called for every handshake or
    /// authenticated request.
    pub fn touch(&self) {
        *self.deadline.lock() = Instant::now() + self.inactivity_timeout;
    }

    /// Enter draining. The first caller fixes the reason; later calls are
    /// noted but change nothing.
    pub fn begin_drain(&self, reason: DrainReason) {
        let mut current = self.drain_reason.lock();
        match *current {
            Some(existing) => {
                tracing::debug!(reason = %reason, winner = %existing, "drain already in progress");
            }
            None => {
                *current = Some(reason);
                tracing::info!(reason = %reason, "draining");
                self.cancel.cancel();
            }
        }
    }

    /// Mark provisioning complete: write the sentinel, then drain.
    /// Re-running against an existing sentinel succeeds without touching
    /// the file.
    pub fn complete(&self) -> std::io::Result<PathBuf> {
        self.write_sentinel()?;
        self.begin_drain(DrainReason::Complete);
        Ok(self.sentinel_path.clone())
    }

    fn write_sentinel(&self) -> std::io::Result<()> {
        use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

        if let Some(parent) = self.sentinel_path.parent() {
            if !parent.exists() {
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o750)
                    .create(parent)?;
            }
        }

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o400)
            .open(&self.sentinel_path)
        {
            Ok(mut file) => {
                use std::io::Write;
                writeln!(file, "provisioned")?;
                tracing::info!(path = %self.sentinel_path.display(), "sentinel created");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::info!(path = %self.sentinel_path.display(), "sentinel already present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Idle timer task. Sleeps until the deadline, re-arming whenever a
    /// touch has pushed it out, and drains on true expiry.
    pub async fn run_idle_timer(&self) {
        loop {
            let deadline = *self.deadline.lock();
            if deadline <= Instant::now() {
                self.begin_drain(DrainReason::Inactivity);
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Signal listener task. SIGTERM and SIGINT both drain; whichever
    /// arrives first wins.
    pub async fn run_signal_listener(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => self.begin_drain(DrainReason::Signal),
            _ = sigint.recv() => self.begin_drain(DrainReason::Signal),
            _ = self.cancel.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(dir: &Path) -> LifecycleController {
        LifecycleController::new(
            dir.join("issued"),
            Duration::from_secs(600),
            Duration::from_secs(5),
        )
    }

    fn test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bp-lifecycle-{}", tag));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_first_drain_reason_wins() {
        let dir = test_dir("reason");
        let lifecycle = controller(&dir);
        lifecycle.begin_drain(DrainReason::Signal);
        lifecycle.begin_drain(DrainReason::Inactivity);
        assert_eq!(lifecycle.drain_reason(), Some(DrainReason::Signal));
        assert!(lifecycle.is_draining());
    }

    #[test]
    fn test_complete_creates_sentinel_mode_0400() {
        use std::os::unix::fs::PermissionsExt;

        let dir = test_dir("sentinel");
        let lifecycle = controller(&dir);
        let path = lifecycle.complete().unwrap();

        assert!(path.exists());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
        assert_eq!(lifecycle.drain_reason(), Some(DrainReason::Complete));
    }

    #[test]
    fn test_complete_idempotent_when_sentinel_exists() {
        let dir = test_dir("idempotent");
        let lifecycle = controller(&dir);
        lifecycle.complete().unwrap();

        let again = controller(&dir);
        assert!(again.complete().is_ok());
    }

    #[test]
    fn test_sentinel_parent_created_with_mode_0750() {
        use std::os::unix::fs::PermissionsExt;

        let dir = test_dir("parent");
        let nested = dir.join("nested");
        let lifecycle = LifecycleController::new(
            nested.join("issued"),
            Duration::from_secs(600),
            Duration::from_secs(5),
        );
        lifecycle.complete().unwrap();

        let mode = std::fs::metadata(&nested).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_sentinel_present() {
        let dir = test_dir("present");
        let path = dir.join("issued");
        assert!(!LifecycleController::sentinel_present(&path));
        std::fs::write(&path, "").unwrap();
        assert!(LifecycleController::sentinel_present(&path));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_drains_after_timeout() {
        let dir = test_dir("idle");
        let lifecycle = std::sync::Arc::new(LifecycleController::new(
            dir.join("issued"),
            Duration::from_secs(600),
            Duration::from_secs(5),
        ));

        let timer = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.run_idle_timer().await })
        };

        tokio::time::advance(Duration::from_secs(601)).await;
        timer.await.unwrap();
        assert_eq!(lifecycle.drain_reason(), Some(DrainReason::Inactivity));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_defers_idle_drain() {
        let dir = test_dir("touch");
        let lifecycle = std::sync::Arc::new(LifecycleController::new(
            dir.join("issued"),
            Duration::from_secs(600),
            Duration::from_secs(5),
        ));

        let timer = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.run_idle_timer().await })
        };

        tokio::time::advance(Duration::from_secs(400)).await;
        lifecycle.touch();
        tokio::time::advance(Duration::from_secs(400)).await;
        assert!(!lifecycle.is_draining());

        tokio::time::advance(Duration::from_secs(201)).await;
        timer.await.unwrap();
        assert_eq!(lifecycle.drain_reason(), Some(DrainReason::Inactivity));
    }
}
