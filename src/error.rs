use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced across the pool core, the browser adapter, and the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("all pooled instances are currently leased out")]
    AllOccupied,

    #[error("no browser instance available: {0}")]
    NoBrowserAvailable(String),

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("browser process died before it became healthy")]
    ProcessDied,

    #[error("unknown session id: {0}")]
    UnknownSession(String),

    #[error("session {0} is not bound to this resource")]
    SessionMismatch(String),

    #[error("upstream probe failed: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream did not advertise a websocket debugger url")]
    NoDebuggerUrl,

    #[error("websocket proxy error: {0}")]
    ProxyError(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GatewayError {
    /// Whether retrying the same operation shortly afterwards is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::AllOccupied
                | GatewayError::NoBrowserAvailable(_)
                | GatewayError::UpstreamUnreachable(_)
                | GatewayError::ProcessDied
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GatewayError::Configuration(_) => ErrorSeverity::High,
            GatewayError::LaunchFailed(_) | GatewayError::ProcessDied => ErrorSeverity::High,
            GatewayError::UnknownSession(_) | GatewayError::SessionMismatch(_) => {
                ErrorSeverity::Low
            }
            _ => ErrorSeverity::Medium,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AllOccupied => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::NoBrowserAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::LaunchFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ProcessDied => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UnknownSession(_) => StatusCode::NOT_FOUND,
            GatewayError::SessionMismatch(_) => StatusCode::CONFLICT,
            GatewayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::NoDebuggerUrl => StatusCode::BAD_GATEWAY,
            GatewayError::ProxyError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::UpstreamUnreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_occupied_is_retryable_and_unavailable() {
        let err = GatewayError::AllOccupied;
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unknown_session_is_not_retryable() {
        let err = GatewayError::UnknownSession("abc".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
