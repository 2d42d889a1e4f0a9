// boardingpassd - ephemeral bootstrap service for headless devices
//
// Opens a short-lived SRP-authenticated channel through which a nearby
// operator provisions a freshly imaged device, then retires itself: once
// provisioning completes a sentinel file is written, and any later start
// finds it and exits before opening a socket.

mod error;
mod handshake;
mod lifecycle;
mod limiter;
mod protocol;
mod server;
mod session;
#[cfg(test)]
mod testutil;
mod verifier;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use boardingpass_shared::config::{get_config, ServiceSettings};
use boardingpass_shared::log::initialize_logging;
use boardingpass_shared::MINUTE;

use handshake::{HandshakeEngine, HandshakeStore};
use lifecycle::LifecycleController;
use limiter::AttemptLimiter;
use server::AppState;
use session::SessionRegistry;
use verifier::{VerifierProvider, VerifierSpec};

/// Default config file name
const DEFAULT_CONFIG: &str = "boardingpassd.conf";

/// Sweep cadence for the expiring stores
const SWEEP_INTERVAL: Duration = Duration::from_secs(MINUTE);

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "boardingpassd")]
#[command(about = "boardingpass bootstrap daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; every key has a default, so a missing file only
    // warns
    let found_config = {
        let mut config = get_config().lock();
        config.set_source(&args.config, "Boardingpass_")
    };

    let settings = {
        let config = get_config().lock();
        ServiceSettings::from_config(&config)
    };

    initialize_logging(settings.logs_dir.as_deref(), "info");

    tracing::info!("boardingpassd v{}", env!("CARGO_PKG_VERSION"));
    if found_config {
        tracing::info!("using configuration file: {}", args.config);
    } else {
        tracing::warn!(
            "configuration file {} not found, using defaults",
            args.config
        );
    }

    // Sentinel gate: a provisioned device has nothing to serve. Checked
    // before any socket is opened.
    let sentinel_path = PathBuf::from(&settings.sentinel_file);
    if LifecycleController::sentinel_present(&sentinel_path) {
        tracing::info!(
            path = %sentinel_path.display(),
            "sentinel present, device already provisioned, exiting"
        );
        return Ok(());
    }

    // Fail fast on broken credential configuration
    let spec = VerifierSpec::load(Path::new(&settings.verifier_file)).map_err(|e| {
        tracing::error!(error = %e, "cannot load verifier spec");
        anyhow::anyhow!("verifier spec unusable: {e}")
    })?;
    tracing::info!(username = %spec.username, "verifier spec loaded");

    let provider = VerifierProvider::new(spec.clone(), settings.handshake_ttl);
    let sessions = Arc::new(SessionRegistry::new(
        &spec.username,
        settings.session_ttl,
        settings.max_sessions,
    ));
    let limiter = Arc::new(AttemptLimiter::new());
    let lifecycle = Arc::new(LifecycleController::new(
        sentinel_path,
        settings.inactivity_timeout,
        settings.drain_grace,
    ));
    let engine = Arc::new(HandshakeEngine::new(
        HandshakeStore::new(settings.handshake_ttl),
        provider,
        sessions.clone(),
        limiter.clone(),
    ));

    let state = AppState {
        engine: engine.clone(),
        sessions: sessions.clone(),
        limiter: limiter.clone(),
        lifecycle: lifecycle.clone(),
    };

    // Background sweepers, all cancel-aware
    let token = lifecycle.cancel_token();
    spawn_sweeper(token.clone(), {
        let engine = engine.clone();
        move || engine.store().sweep()
    });
    spawn_sweeper(token.clone(), {
        let sessions = sessions.clone();
        move || sessions.sweep()
    });
    spawn_sweeper(token.clone(), {
        let limiter = limiter.clone();
        move || limiter.sweep()
    });

    // Idle timer and signal handling
    {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.run_idle_timer().await });
    }
    {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.run_signal_listener().await });
    }

    let bind_addr = format!("{}:{}", settings.bind_ip, settings.port);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        tracing::error!(error = %e, addr = %bind_addr, "cannot bind listener");
        anyhow::anyhow!("bind failed: {e}")
    })?;
    tracing::info!("listening on {}", bind_addr);

    let router = server::build_router(state);
    server::serve_with_drain(listener, router, lifecycle.clone()).await?;

    match lifecycle.drain_reason() {
        Some(reason) => tracing::info!(reason = %reason, "drained, exiting"),
        None => tracing::info!("acceptor stopped, exiting"),
    }
    Ok(())
}

/// One sweeper task: ticks every minute, exits promptly on cancellation.
fn spawn_sweeper<F>(token: CancellationToken, sweep: F)
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => sweep(),
                _ = token.cancelled() => break,
            }
        }
    });
}
