use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use hyper::{Method, Request, StatusCode};
use shared::types::json_error::ErrorResponse;
use shared::types::server_config::TokenGrant;
use tracing::{debug, error, warn};

use crate::AppState;
use crate::handlers::http::notifications;
use crate::handlers::http::utils::headers::extract_token;
use crate::handlers::http::utils::json_response::{self, JsonResponse};

pub type Incoming = Request<hyper::body::Incoming>;

/// `:name` segments captured from the request path.
pub type PathParams = HashMap<String, String>;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<JsonResponse>> + Send>>;

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Two tiers:
//
//   OpenHandler   — no auth. Receives (req, state).
//                   Use for: /health.
//
//   AuthedHandler — bearer token (header or cookie) resolved to a grant.
//                   Receives (req, state, grant, params).
//                   Use for: everything scoped to a user.

type OpenHandler = Box<dyn Fn(Incoming, AppState) -> HandlerFuture + Send + Sync>;

type AuthedHandler =
    Box<dyn Fn(Incoming, AppState, TokenGrant, PathParams) -> HandlerFuture + Send + Sync>;

enum RouteKind {
    Open(OpenHandler),
    Authed(AuthedHandler),
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route with no authentication.
    pub fn open<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Incoming, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        });
        self
    }

    /// Route guarded by a bearer token. The router resolves the grant before
    /// the handler runs; handlers must not re-check it.
    pub fn authed<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Incoming, AppState, TokenGrant, PathParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Authed(Box::new(move |req, state, grant, params| {
                Box::pin(handler(req, state, grant, params))
            })),
        });
        self
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(&self, req: Incoming, state: AppState) -> Result<JsonResponse> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        for route in &self.routes {
            if route.method != method {
                continue;
            }
            let Some(params) = match_path(&route.path, &path) else {
                continue;
            };

            return match &route.kind {
                RouteKind::Open(h) => h(req, state).await,
                RouteKind::Authed(h) => {
                    let grant = extract_token(req.headers())
                        .and_then(|token| state.authenticate(token));
                    match grant {
                        Some(grant) => h(req, state, grant, params).await,
                        None => {
                            warn!("Rejected {} {}: missing or unknown token", method, path);
                            json_response::deliver_error_json(
                                &ErrorResponse::unauthorized(),
                                StatusCode::UNAUTHORIZED,
                            )
                            .context("Failed to deliver 401 response")
                        }
                    }
                }
            };
        }

        debug!("No route for {} {}", method, path);
        json_response::deliver_error_json(
            &ErrorResponse::new("NOT_FOUND", "Endpoint not found"),
            StatusCode::NOT_FOUND,
        )
        .context("Failed to deliver 404 response")
    }

    /// hyper service entry point. Handler failures become a 500.
    pub async fn handle(&self, req: Incoming, state: AppState) -> Result<JsonResponse, Infallible> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.route(req, state).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!("{} {} failed: {:#}", method, path, e);
                Ok(json_response::internal_error())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Path matching
// ---------------------------------------------------------------------------

/// Segment-by-segment match with `:param` wildcards, e.g.
/// `"/notifications/:id/read"` matches `"/notifications/42/read"`.
pub fn match_path(route_path: &str, request_path: &str) -> Option<PathParams> {
    let clean = request_path.split('?').next().unwrap_or(request_path);

    let route_segs: Vec<&str> = route_path.split('/').collect();
    let path_segs: Vec<&str> = clean.split('/').collect();
    if route_segs.len() != path_segs.len() {
        return None;
    }

    let mut params = PathParams::new();
    for (r, p) in route_segs.iter().zip(path_segs.iter()) {
        match r.strip_prefix(':') {
            Some(name) if !p.is_empty() => {
                let value = urlencoding::decode(p).ok()?;
                params.insert(name.to_string(), value.into_owned());
            }
            Some(_) => return None,
            None if r == p => {}
            None => return None,
        }
    }
    Some(params)
}

// ---------------------------------------------------------------------------
// API router
// ---------------------------------------------------------------------------

pub fn build_router() -> Router {
    Router::new()
        // ── Public ───────────────────────────────────────────────────────────
        .open(Method::GET, "/health", |_req, _state| async move {
            json_response::deliver_serialized_json(
                &serde_json::json!({ "status": "ok" }),
                StatusCode::OK,
            )
        })
        // ── Push ─────────────────────────────────────────────────────────────
        .authed(Method::GET, "/notifications/sse/subscribe", notifications::subscribe)
        // ── Notifications ────────────────────────────────────────────────────
        .authed(Method::GET, "/notifications", notifications::list)
        .authed(Method::GET, "/notifications/unread", notifications::unread)
        .authed(Method::POST, "/notifications", notifications::publish)
        .authed(Method::POST, "/notifications/clear", notifications::clear)
        .authed(Method::POST, "/notifications/broadcast", notifications::broadcast)
        .authed(Method::POST, "/notifications/:id/read", notifications::mark_read)
        .authed(Method::DELETE, "/notifications/:id", notifications::delete)
}
