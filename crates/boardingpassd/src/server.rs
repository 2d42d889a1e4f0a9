// HTTP surface - axum router, bearer-token gate, request handlers
//
// Only the two handshake endpoints and the health probe bypass the gate;
// everything else requires a live session token. TLS termination is the
// deployment's concern.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use data_encoding::BASE64;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::handshake::{HandshakeEngine, HandshakeError};
use crate::lifecycle::LifecycleController;
use crate::limiter::{AttemptDecision, AttemptLimiter};
use crate::protocol::*;
use crate::session::{Session, SessionError, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<HandshakeEngine>,
    pub sessions: Arc<SessionRegistry>,
    pub limiter: Arc<AttemptLimiter>,
    pub lifecycle: Arc<LifecycleController>,
}

/// Build the full router.
pub fn build_router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/complete", post(complete))
        .route("/auth/logout", post(logout))
        .layer(middleware::from_fn_with_state(state.clone(), auth_gate));

    Router::new()
        .route("/auth/srp/init", post(srp_init))
        .route("/auth/srp/verify", post(srp_verify))
        .route("/healthz", get(healthz))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request-authentication middleware. Passes a validated Session to the
/// downstream handler or answers 401 with a machine-readable code.
async fn auth_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::MissingCredential)?;

    let token = header_value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MalformedCredential)?;

    let session = state.sessions.validate(token).map_err(|e| match e {
        SessionError::Expired => ApiError::ExpiredCredential,
        SessionError::NotFound | SessionError::SignatureInvalid => ApiError::InvalidCredential,
        SessionError::LimitExceeded => ApiError::Internal,
    })?;

    state.lifecycle.touch();
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// POST /auth/srp/init
async fn srp_init(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<SrpInitRequest>, JsonRejection>,
) -> Result<Json<SrpInitResponse>, ApiError> {
    if state.lifecycle.is_draining() {
        return Err(ApiError::ShuttingDown);
    }
    let Json(request) = payload.map_err(|_| ApiError::MalformedRequest)?;
    let peer = addr.ip().to_string();
    check_rate(&state.limiter, &peer)?;

    let a_bytes = BASE64.decode(request.a.as_bytes()).map_err(|_| {
        state.limiter.on_failure(&peer);
        ApiError::AuthenticationFailed
    })?;

    let challenge = state
        .engine
        .init(&request.username, &a_bytes, &peer)
        .await
        .map_err(map_handshake_error)?;

    state.lifecycle.touch();
    Ok(Json(SrpInitResponse {
        session_id: challenge.session_id,
        salt: BASE64.encode(&challenge.salt),
        b: BASE64.encode(&challenge.server_public),
    }))
}

/// POST /auth/srp/verify
async fn srp_verify(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<SrpVerifyRequest>, JsonRejection>,
) -> Result<Json<SrpVerifyResponse>, ApiError> {
    if state.lifecycle.is_draining() {
        return Err(ApiError::ShuttingDown);
    }
    let Json(request) = payload.map_err(|_| ApiError::MalformedRequest)?;
    let peer = addr.ip().to_string();
    check_rate(&state.limiter, &peer)?;

    let m1_bytes = BASE64.decode(request.m1.as_bytes()).map_err(|_| {
        state.limiter.on_failure(&peer);
        ApiError::AuthenticationFailed
    })?;

    let proof = state
        .engine
        .verify(&request.session_id, &m1_bytes, &peer)
        .map_err(map_handshake_error)?;

    state.lifecycle.touch();
    Ok(Json(SrpVerifyResponse {
        m2: BASE64.encode(&proof.m2),
        expires_in_seconds: proof.session.remaining().as_secs(),
        session_token: proof.session.token,
    }))
}

/// POST /complete (gated). Writes the sentinel and starts draining.
async fn complete(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<CompleteResponse>, ApiError> {
    tracing::info!(username = %session.username, "provisioning complete requested");
    let sentinel = state.lifecycle.complete().map_err(|e| {
        tracing::error!(error = %e, "sentinel creation failed");
        ApiError::Internal
    })?;

    Ok(Json(CompleteResponse {
        status: "completed",
        sentinel_file: sentinel.display().to_string(),
    }))
}

/// POST /auth/logout (gated). Retires the presented token.
async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<LogoutResponse> {
    state.sessions.invalidate(&session.token);
    tracing::info!(
        username = %session.username,
        session_age_secs = session.created_at.elapsed().as_secs(),
        "session invalidated"
    );
    Json(LogoutResponse { status: "ok" })
}

/// GET /healthz (ungated). Does not touch the idle timer.
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn check_rate(limiter: &AttemptLimiter, peer: &str) -> Result<(), ApiError> {
    match limiter.check(peer) {
        AttemptDecision::Allowed => Ok(()),
        AttemptDecision::Locked { retry_after } => {
            // Round up so the client never comes back early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            Err(ApiError::RateLimited {
                retry_after_seconds: secs.max(1),
            })
        }
    }
}

fn map_handshake_error(error: HandshakeError) -> ApiError {
    match error {
        HandshakeError::InvalidParameter
        | HandshakeError::ProofMismatch
        | HandshakeError::SessionNotFound => ApiError::AuthenticationFailed,
        HandshakeError::SessionLimit => ApiError::SessionLimitExceeded,
        HandshakeError::Internal => ApiError::Internal,
    }
}

/// Serve until the lifecycle cancels, then allow in-flight requests a
/// bounded grace period before aborting what remains.
pub async fn serve_with_drain(
    listener: tokio::net::TcpListener,
    router: Router,
    lifecycle: Arc<LifecycleController>,
) -> anyhow::Result<()> {
    let token = lifecycle.cancel_token();
    let shutdown = token.clone();

    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    });

    tokio::select! {
        result = &mut server => {
            // The acceptor ended on its own; surface any transport error
            result??;
            return Ok(());
        }
        _ = token.cancelled() => {}
    }

    match tokio::time::timeout(lifecycle.drain_grace(), &mut server).await {
        Ok(result) => result??,
        Err(_) => {
            tracing::warn!("drain grace elapsed, aborting open connections");
            server.abort();
        }
    }
    Ok(())
}
