//! Notification server for local development and tests.
//!
//! Serves the SSE push endpoint and the REST endpoints from memory. Every
//! stream and collection is scoped to the `(tenant, user)` pair its bearer
//! token was granted, and every mutation is echoed as a push event.

pub mod handlers;
pub mod repo;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use serde_json::Value;
use shared::types::event::NotificationEvent;
use shared::types::notification::{NewNotification, Notification};
use shared::types::server_config::{PushServerConfig, TokenGrant};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handlers::http::routes::build_router;
use crate::handlers::sse::SseManager;
use crate::repo::{NotificationRepo, scope_key};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PushServerConfig>,
    pub sse: Arc<SseManager>,
    pub repo: Arc<NotificationRepo>,
}

impl AppState {
    pub fn new(config: PushServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            sse: Arc::new(SseManager::new()),
            repo: Arc::new(NotificationRepo::new()),
        }
    }

    pub fn authenticate(&self, token: &str) -> Option<TokenGrant> {
        self.config.grant_for(token).cloned()
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.config.server.heartbeat_secs)
    }

    /// Store a new notification for the grant's scope and push it.
    pub async fn publish(&self, grant: &TokenGrant, new: NewNotification) -> Notification {
        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind: new.kind,
            title: new.title,
            message: new.message,
            data: new.data,
            is_read: false,
            read_at: None,
            user_id: grant.user_id.clone(),
            tenant_id: grant.tenant_id.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            deleted_at: None,
            expires_at: new.expires_at,
            is_action_required: new.is_action_required,
            action_url: new.action_url,
            metadata: new.metadata,
        };

        let scope = scope_key(&grant.tenant_id, &grant.user_id);
        self.repo.insert(&scope, notification.clone()).await;
        self.echo(&scope, NotificationEvent::Notification(notification.clone())).await;
        notification
    }

    pub async fn mark_read(&self, grant: &TokenGrant, id: &str) -> Option<DateTime<Utc>> {
        let scope = scope_key(&grant.tenant_id, &grant.user_id);
        let read_at = self.repo.mark_read(&scope, id).await?;
        let event = NotificationEvent::NotificationRead {
            id: id.to_string(),
            read_at: Some(read_at),
        };
        self.echo(&scope, event).await;
        Some(read_at)
    }

    pub async fn delete(&self, grant: &TokenGrant, id: &str) -> bool {
        let scope = scope_key(&grant.tenant_id, &grant.user_id);
        if !self.repo.delete(&scope, id).await {
            return false;
        }
        self.echo(&scope, NotificationEvent::NotificationDeleted { id: id.to_string() }).await;
        true
    }

    pub async fn clear(&self, grant: &TokenGrant) -> usize {
        let scope = scope_key(&grant.tenant_id, &grant.user_id);
        let removed = self.repo.clear(&scope).await;
        self.echo(&scope, NotificationEvent::NotificationsCleared).await;
        removed
    }

    pub async fn broadcast(&self, tenant_id: &str, payload: Value) -> usize {
        self.sse
            .broadcast_to_tenant(tenant_id, NotificationEvent::Broadcast(payload))
            .await
    }

    async fn echo(&self, scope: &str, event: NotificationEvent) {
        if let Err(e) = self.sse.broadcast_to(scope, event).await {
            warn!("Push echo to {} failed: {}", scope, e);
        }
    }
}

/// Accept connections on `listener` until it fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let router = Arc::new(build_router());
    info!("Listening on http://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        let router = router.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                let router = router.clone();
                async move { router.handle(req, state).await }
            });

            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, service)
                .await
            {
                debug!("Connection from {} ended: {:?}", peer, err);
            }
        });
    }
}
