use std::convert::Infallible;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use serde_json::json;
use shared::types::json_error::ErrorResponse;
use tracing::{debug, warn};

pub type JsonResponse = Response<BoxBody<Bytes, Infallible>>;

/// Serialize any `Serialize` type and deliver it as a JSON response.
pub fn deliver_serialized_json<T: Serialize>(data: &T, status: StatusCode) -> Result<JsonResponse> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)).boxed())
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))
}

/// Delivers a JSON error response in the shared `ErrorResponse` shape.
pub fn deliver_error_json(error: &ErrorResponse, status: StatusCode) -> Result<JsonResponse> {
    warn!("Delivering error JSON: {} - {}", status.as_u16(), error);
    deliver_serialized_json(error, status)
}

/// Delivers `{"status":"success"}`.
pub fn deliver_success_json() -> Result<JsonResponse> {
    deliver_serialized_json(&json!({ "status": "success" }), StatusCode::OK)
}

/// Last-resort response when building a proper one failed.
pub fn internal_error() -> JsonResponse {
    let body = json!({
        "status": "error",
        "code": "INTERNAL_ERROR",
        "message": "Internal server error",
    })
    .to_string();

    let mut response = Response::new(Full::new(Bytes::from(body)).boxed());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
