// Wire protocol types
// JSON bodies for the handshake and provisioning-control endpoints.
// Binary values travel as base64 (standard alphabet); session ids and
// token halves as URL-safe base64 without padding.

use serde::{Deserialize, Serialize};

/// POST /auth/srp/init request
#[derive(Debug, Deserialize)]
pub struct SrpInitRequest {
    pub username: String,
    /// Client public ephemeral, base64 of the big-endian encoding
    #[serde(rename = "A")]
    pub a: String,
}

/// POST /auth/srp/init response
#[derive(Debug, Serialize)]
pub struct SrpInitResponse {
    pub session_id: String,
    /// Account salt, base64
    pub salt: String,
    /// Server public ephemeral, base64 of the big-endian encoding
    #[serde(rename = "B")]
    pub b: String,
}

/// POST /auth/srp/verify request
#[derive(Debug, Deserialize)]
pub struct SrpVerifyRequest {
    pub session_id: String,
    /// Client proof, base64
    #[serde(rename = "M1")]
    pub m1: String,
}

/// POST /auth/srp/verify response
#[derive(Debug, Serialize)]
pub struct SrpVerifyResponse {
    /// Server proof, base64
    #[serde(rename = "M2")]
    pub m2: String,
    pub session_token: String,
    pub expires_in_seconds: u64,
}

/// POST /complete response
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub status: &'static str,
    pub sentinel_file: String,
}

/// POST /auth/logout response
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub status: &'static str,
}

/// GET /healthz response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Normalized error body. Internal detail never crosses the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}
