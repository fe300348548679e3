use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

/// Tokens this close to expiry are treated as already expired.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Supplies a currently valid bearer token, refreshing it if it has to.
pub trait CredentialProvider: Send + Sync {
    /// `None` when no valid credential can be produced (logged out, refresh
    /// failed). Callers must not attempt an authenticated call then.
    fn bearer_token(&self) -> BoxFuture<'_, Option<String>>;

    /// The server rejected `token`. The next `bearer_token` call should not
    /// hand it out again.
    fn invalidate(&self, _token: &str) {}
}

// ---------------------------------------------------------------------------
// Static token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn from_option(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { self.0.clone() })
    }
}

// ---------------------------------------------------------------------------
// Refreshing token store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Exchanges a refresh token for a new pair. Implemented by the auth API
/// glue; this crate only consumes it.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self, refresh_token: String) -> BoxFuture<'_, anyhow::Result<TokenPair>>;
}

/// In-memory access/refresh token pair.
///
/// The access token is handed out while its `exp` claim is more than
/// [`EXPIRY_SKEW`] away. Past that, one caller refreshes and every other
/// concurrent caller waits for that same refresh.
pub struct TokenStore {
    tokens: Mutex<Option<TokenPair>>,
    refresh_lock: tokio::sync::Mutex<()>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            refresher: None,
        }
    }

    pub fn with_refresher(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher: Some(refresher),
            ..Self::new()
        }
    }

    pub fn set_tokens(&self, pair: TokenPair) {
        *self.lock() = Some(pair);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().as_ref().map(|pair| pair.access_token.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<TokenPair>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_valid(&self) -> Option<String> {
        self.access_token()
            .filter(|token| is_token_valid(token, Utc::now()))
    }

    async fn valid_token(&self) -> Option<String> {
        if let Some(token) = self.current_valid() {
            return Some(token);
        }

        let refresher = self.refresher.as_ref()?;
        let _guard = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we waited.
        if let Some(token) = self.current_valid() {
            return Some(token);
        }

        let refresh_token = self.lock().as_ref()?.refresh_token.clone();
        debug!("Access token expired, refreshing");

        match refresher.refresh(refresh_token).await {
            Ok(pair) => {
                let token = pair.access_token.clone();
                self.set_tokens(pair);
                Some(token)
            }
            Err(e) => {
                warn!("Token refresh failed, clearing credentials: {:#}", e);
                self.clear();
                None
            }
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for TokenStore {
    fn bearer_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(self.valid_token())
    }

    fn invalidate(&self, token: &str) {
        let mut tokens = self.lock();
        if let Some(pair) = tokens.as_mut().filter(|pair| pair.access_token == token) {
            debug!("Access token rejected by server, forcing refresh");
            pair.access_token.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// JWT expiry
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Read the `exp` claim without verifying the signature. The server does
/// the verifying; the client only needs to know when to refresh.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claim.exp, 0)
}

pub fn is_token_valid(token: &str, now: DateTime<Utc>) -> bool {
    let Ok(skew) = chrono::Duration::from_std(EXPIRY_SKEW) else {
        return false;
    };
    token_expiry(token).is_some_and(|exp| exp > now + skew)
}
