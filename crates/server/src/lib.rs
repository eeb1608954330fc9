//! Voice Bridge Server
//!
//! HTTP and WebSocket surface: provider webhooks, outbound call placement,
//! the media-stream endpoint and Prometheus metrics.

pub mod http;
pub mod media_stream;
pub mod metrics;
pub mod registry;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use registry::{ActiveCall, SessionGuard, SessionRegistry};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Call control error: {0}")]
    CallControl(#[from] voice_bridge_transport::TransportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::WebSocket(_) | ServerError::Handshake(_) => {
                axum::http::StatusCode::BAD_REQUEST
            }
            ServerError::CallControl(_) => axum::http::StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
