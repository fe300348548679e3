//! REST and push endpoints. Every handler is already authenticated; the
//! grant decides which `tenant:user` scope it touches.

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::StatusCode;
use serde_json::Value;
use shared::types::json_error::ErrorResponse;
use shared::types::notification::{NewNotification, NotificationsResponse};
use shared::types::server_config::TokenGrant;
use tracing::warn;

use crate::AppState;
use crate::handlers::http::routes::{Incoming, PathParams};
use crate::handlers::http::utils::json_response::{
    JsonResponse, deliver_error_json, deliver_serialized_json, deliver_success_json,
};
use crate::handlers::sse::handle_sse_subscribe;
use crate::repo::scope_key;

const MAX_BODY_BYTES: usize = 64 * 1024;

fn scope(grant: &TokenGrant) -> String {
    scope_key(&grant.tenant_id, &grant.user_id)
}

fn id_param(params: &PathParams) -> Result<&str> {
    params
        .get("id")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("route is missing its :id segment"))
}

async fn read_body(req: Incoming) -> Result<Bytes> {
    let collected = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| anyhow!("Failed to read request body: {}", e))?;
    Ok(collected.to_bytes())
}

fn bad_request(message: &str) -> Result<JsonResponse> {
    deliver_error_json(&ErrorResponse::new("BAD_REQUEST", message), StatusCode::BAD_REQUEST)
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

pub async fn subscribe(
    _req: Incoming,
    state: AppState,
    grant: TokenGrant,
    _params: PathParams,
) -> Result<JsonResponse> {
    handle_sse_subscribe(&state.sse, grant, state.heartbeat())
        .await
        .context("Failed to open SSE stream")
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Full list, wrapped in the `{ data, total, unreadCount }` envelope.
pub async fn list(
    _req: Incoming,
    state: AppState,
    grant: TokenGrant,
    _params: PathParams,
) -> Result<JsonResponse> {
    let data = state.repo.list(&scope(&grant)).await;
    let response = NotificationsResponse {
        total: data.len(),
        unread_count: data.iter().filter(|n| !n.is_read).count(),
        data,
    };
    deliver_serialized_json(&response, StatusCode::OK)
}

/// Unread only, as a bare array.
pub async fn unread(
    _req: Incoming,
    state: AppState,
    grant: TokenGrant,
    _params: PathParams,
) -> Result<JsonResponse> {
    let data = state.repo.unread(&scope(&grant)).await;
    deliver_serialized_json(&data, StatusCode::OK)
}

// ---------------------------------------------------------------------------
// Mutations (each is echoed over the push link)
// ---------------------------------------------------------------------------

pub async fn mark_read(
    _req: Incoming,
    state: AppState,
    grant: TokenGrant,
    params: PathParams,
) -> Result<JsonResponse> {
    let id = id_param(&params)?;
    match state.mark_read(&grant, id).await {
        Some(_) => deliver_success_json(),
        None => deliver_error_json(&ErrorResponse::not_found(id), StatusCode::NOT_FOUND),
    }
}

pub async fn delete(
    _req: Incoming,
    state: AppState,
    grant: TokenGrant,
    params: PathParams,
) -> Result<JsonResponse> {
    let id = id_param(&params)?;
    if state.delete(&grant, id).await {
        deliver_success_json()
    } else {
        deliver_error_json(&ErrorResponse::not_found(id), StatusCode::NOT_FOUND)
    }
}

pub async fn clear(
    _req: Incoming,
    state: AppState,
    grant: TokenGrant,
    _params: PathParams,
) -> Result<JsonResponse> {
    state.clear(&grant).await;
    deliver_success_json()
}

/// Development convenience: create a notification for the caller.
pub async fn publish(
    req: Incoming,
    state: AppState,
    grant: TokenGrant,
    _params: PathParams,
) -> Result<JsonResponse> {
    let body = read_body(req).await?;
    let new: NewNotification = match serde_json::from_slice(&body) {
        Ok(new) => new,
        Err(e) => {
            warn!("Rejected publish from {}: {}", grant.user_id, e);
            return bad_request(&format!("Invalid notification: {}", e));
        }
    };

    let notification = state.publish(&grant, new).await;
    deliver_serialized_json(&notification, StatusCode::CREATED)
}

/// Development convenience: announce something to the caller's whole tenant.
pub async fn broadcast(
    req: Incoming,
    state: AppState,
    grant: TokenGrant,
    _params: PathParams,
) -> Result<JsonResponse> {
    let body = read_body(req).await?;
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return bad_request("Body must be JSON");
    };

    let reached = state.broadcast(&grant.tenant_id, payload).await;
    deliver_serialized_json(&serde_json::json!({ "status": "success", "reached": reached }), StatusCode::OK)
}
