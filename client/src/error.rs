use std::time::Duration;

use hyper::StatusCode;
use shared::types::sse::SseError;
use thiserror::Error;

/// Failures opening or reading the push link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build subscribe request: {0}")]
    Request(#[from] http::Error),

    #[error("push connection failed: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("push endpoint did not answer within {0:?}")]
    ConnectTimeout(Duration),

    #[error("push endpoint answered {0}")]
    Status(StatusCode),

    #[error("push stream error: {0}")]
    Body(#[from] hyper::Error),

    #[error("no data from push endpoint for {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("malformed push stream: {0}")]
    Stream(#[from] SseError),
}

/// Failures of request/response calls against the notifications API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no valid credential available")]
    Unauthenticated,

    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    #[error("request failed: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("API answered {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a global connection manager is already installed")]
    AlreadyInstalled,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("store sync task has stopped")]
    SyncStopped,
}
