use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Empty};
use hyper::header::{ACCEPT, AUTHORIZATION};
use hyper::{Method, Request, StatusCode};
use shared::types::client_config::ApiConfig;
use shared::types::json_error::ErrorResponse;
use shared::types::notification::{Notification, NotificationList};
use tracing::{debug, warn};

use crate::credentials::CredentialProvider;
use crate::error::ApiError;
use crate::transport::sse::{HttpClient, http_client};

/// Request/response half of the notification service.
///
/// Mutations only report success or failure; the resulting state change is
/// applied by the caller (and echoed back over the push link).
pub trait NotificationsApi: Send + Sync {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<Notification>, ApiError>>;
    fn fetch_unread(&self) -> BoxFuture<'_, Result<Vec<Notification>, ApiError>>;
    fn mark_read<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;
    fn clear_all(&self) -> BoxFuture<'_, Result<(), ApiError>>;
}

pub struct HttpNotificationsApi {
    client: HttpClient,
    config: ApiConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpNotificationsApi {
    pub fn new(config: ApiConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_client(http_client(), config, credentials)
    }

    pub fn with_client(
        client: HttpClient,
        config: ApiConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    fn request(&self, method: &Method, path: &str, token: &str) -> Result<Request<Empty<Bytes>>, ApiError> {
        Ok(Request::builder()
            .method(method.clone())
            .uri(self.config.url(path))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())?)
    }

    /// Send one authenticated request and return the body of a 2xx answer.
    /// A 401 invalidates the token and is retried once with a fresh one.
    async fn send(&self, method: Method, path: &str) -> Result<Bytes, ApiError> {
        let mut retried = false;

        loop {
            let token = self
                .credentials
                .bearer_token()
                .await
                .ok_or(ApiError::Unauthenticated)?;

            debug!("{} {}", method, path);
            let response = self.client.request(self.request(&method, path, &token)?).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();

            if status == StatusCode::UNAUTHORIZED && !retried {
                warn!("{} {} rejected the token, retrying once", method, path);
                self.credentials.invalidate(&token);
                retried = true;
                continue;
            }

            if !status.is_success() {
                return Err(ApiError::Status {
                    status,
                    message: error_message(&body),
                });
            }

            return Ok(body);
        }
    }

    async fn fetch_list(&self, path: &str) -> Result<Vec<Notification>, ApiError> {
        let body = self.send(Method::GET, path).await?;
        let list: NotificationList = serde_json::from_slice(&body)?;
        Ok(list.into_vec())
    }
}

fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(error) => error.to_string(),
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// `/notifications/{id}{suffix}` with the id escaped as one path segment.
fn item_path(id: &str, suffix: &str) -> String {
    format!("/notifications/{}{}", urlencoding::encode(id), suffix)
}

impl NotificationsApi for HttpNotificationsApi {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<Notification>, ApiError>> {
        Box::pin(self.fetch_list("/notifications"))
    }

    fn fetch_unread(&self) -> BoxFuture<'_, Result<Vec<Notification>, ApiError>> {
        Box::pin(self.fetch_list("/notifications/unread"))
    }

    fn mark_read<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.send(Method::POST, &item_path(id, "/read")).await?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.send(Method::DELETE, &item_path(id, "")).await?;
            Ok(())
        })
    }

    fn clear_all(&self) -> BoxFuture<'_, Result<(), ApiError>> {
        Box::pin(async move {
            self.send(Method::POST, "/notifications/clear").await?;
            Ok(())
        })
    }
}
