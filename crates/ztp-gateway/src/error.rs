//! Error types for device gateway operations

use std::net::Ipv4Addr;
use thiserror::Error;

/// Error type for device gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Could not reach the device API
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Device API did not answer in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Device API answered with a non-success status
    #[error("device API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// Device API accepted the call but the device refused it
    #[error("device {device} rejected the request: {reason}")]
    Rejected { device: Ipv4Addr, reason: String },

    /// Operation not available on this gateway
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl GatewayError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::ConnectionFailed(_) | GatewayError::Timeout(_) => true,
            GatewayError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            GatewayError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            GatewayError::ConnectionFailed(err.to_string())
        }
    }
}

/// Result type for device gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
