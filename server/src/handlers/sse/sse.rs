use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyExt, StreamBody, combinators::BoxBody};
use hyper::{Response, StatusCode, body::Frame, header::HeaderValue};
use serde_json::json;
use shared::types::event::NotificationEvent;
use shared::types::server_config::TokenGrant;
use shared::types::sse::{SseError, SseResult, format_comment, format_event};
use tokio::sync::{RwLock, broadcast};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::repo::scope_key;

const CHANNEL_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// SseManager
// ---------------------------------------------------------------------------

/// SSE connection manager. Holds one broadcast channel per `tenant:user`
/// scope; every open stream for that scope subscribes to it.
#[derive(Debug, Default)]
pub struct SseManager {
    /// scope → broadcast sender
    pub channels: RwLock<HashMap<String, broadcast::Sender<NotificationEvent>>>,
}

impl SseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the broadcast channel for a scope
    pub async fn get_channel(&self, scope: &str) -> broadcast::Sender<NotificationEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(scope.to_string())
            .or_insert_with(|| {
                info!("Creating new SSE channel for {}", scope);
                let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
                tx
            })
            .clone()
    }

    /// Send an event to every stream open for `scope`. Returns the number of
    /// streams it reached.
    pub async fn broadcast_to(&self, scope: &str, event: NotificationEvent) -> SseResult<usize> {
        let channels = self.channels.read().await;
        let Some(tx) = channels.get(scope) else {
            debug!("No channel for {}, dropping {} event", scope, event.kind());
            return Ok(0);
        };

        let count = tx.receiver_count();
        if count == 0 {
            return Ok(0);
        }

        info!("Broadcasting {} event to {} ({} subscribers)", event.kind(), scope, count);
        tx.send(event).map_err(|_| {
            error!("Failed to send SSE event to {}", scope);
            SseError::ChannelSendFailed(format!("no live receivers for {}", scope))
        })?;
        Ok(count)
    }

    /// Send the same event to every scope in a tenant. Returns how many scopes
    /// had at least one open stream.
    pub async fn broadcast_to_tenant(&self, tenant_id: &str, event: NotificationEvent) -> usize {
        let prefix = format!("{}:", tenant_id);
        let channels = self.channels.read().await;
        let mut reached = 0;

        for (scope, tx) in channels.iter().filter(|(scope, _)| scope.starts_with(&prefix)) {
            match tx.send(event.clone()) {
                Ok(_) => reached += 1,
                Err(_) => debug!("No receivers for {}", scope),
            }
        }

        info!("Broadcast {} event to {} scopes in tenant {}", event.kind(), reached, tenant_id);
        reached
    }

    /// Remove channels with no active subscribers
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let after = channels.len();
        if before != after {
            info!(
                "SSE cleanup: removed {} inactive channels ({} → {} remaining)",
                before - after,
                before,
                after
            );
        }
    }
}

// ---------------------------------------------------------------------------
// SSE subscribe handler
// ---------------------------------------------------------------------------

fn response_headers() -> (HeaderValue, HeaderValue) {
    (
        HeaderValue::from_static("text/event-stream"),
        HeaderValue::from_static("no-cache"),
    )
}

/// Stream live events for the authenticated scope.
///
/// ### Event sequence emitted
/// ```text
/// event: connected        handshake OK, carries userId/tenantId
/// event: <live events>    notification, notification_read, ...
/// : keep-alive            comment every `heartbeat`
/// event: reconnect        client lagged; the stream ends after this
/// ```
pub async fn handle_sse_subscribe(
    manager: &SseManager,
    grant: TokenGrant,
    heartbeat: Duration,
) -> SseResult<Response<BoxBody<Bytes, Infallible>>> {
    let scope = scope_key(&grant.tenant_id, &grant.user_id);
    let mut rx = manager.get_channel(&scope).await.subscribe();

    let (content_type, cache_control) = response_headers();

    let stream = async_stream::stream! {
        info!("SSE connected: {}", scope);
        let hello = json!({ "userId": grant.user_id, "tenantId": grant.tenant_id });
        yield Ok::<Bytes, Infallible>(Bytes::from(format_event("connected", &hello)));

        let mut ticker = time::interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // `yield` cannot sit inside select!, so pick first and emit after.
            let next = tokio::select! {
                received = rx.recv() => Some(received),
                _ = ticker.tick() => None,
            };

            match next {
                Some(Ok(event)) => {
                    if let Some((name, payload)) = event.to_wire() {
                        debug!("SSE live event '{}' → {}", name, scope);
                        yield Ok(Bytes::from(format_event(name, &payload)));
                    }
                }
                Some(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!("SSE client {} lagged by {} events, closing stream", scope, n);
                    let hint = json!({ "reason": "lagged", "missed": n });
                    yield Ok(Bytes::from(format_event("reconnect", &hint)));
                    break;
                }
                Some(Err(broadcast::error::RecvError::Closed)) => {
                    info!("SSE channel closed: {}", scope);
                    break;
                }
                None => yield Ok(Bytes::from(format_comment("keep-alive"))),
            }
        }
    };

    let body = BodyExt::boxed(StreamBody::new(
        stream.map(|result| result.map(Frame::data)),
    ));

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", content_type)
        .header("cache-control", cache_control)
        .header("connection", "keep-alive")
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| {
            error!("Failed to build SSE response: {}", e);
            SseError::ChannelSendFailed("Failed to build SSE response".to_string())
        })
}
