use std::time::Duration;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Request/response API location.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

/// Push endpoint location. May live on a different host/port than the API.
#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    pub base_url: String,
    #[serde(default = "default_subscribe_path")]
    pub subscribe_path: String,
    /// Silence longer than this on an open stream counts as a dropped link.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
    /// Longest wait for the subscribe response before the attempt fails.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Static bearer token. `NOTIFY_TOKEN` takes priority when set.
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub push: PushConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ClientConfig {
    /// Apply environment-level overrides. `lookup` is `std::env::var` in
    /// production; tests pass a map.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = lookup("NOTIFY_API_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = lookup("NOTIFY_PUSH_URL") {
            self.push.base_url = url;
        }
        if let Some(token) = lookup("NOTIFY_TOKEN") {
            self.auth.token = Some(token);
        }
    }
}

impl ApiConfig {
    /// Join an endpoint path onto the base URL, e.g. `"/notifications"`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl PushConfig {
    /// Full subscription URL, e.g. `"http://127.0.0.1:1337/notifications/sse/subscribe"`
    pub fn subscribe_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.subscribe_path
        )
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            health_check_interval_secs: default_health_check_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_subscribe_path() -> String {
    "/notifications/sse/subscribe".to_string()
}

pub fn default_heartbeat_timeout() -> u64 {
    60
}

pub fn default_connect_timeout() -> u64 {
    10
}

pub fn default_base_delay() -> u64 {
    1_000
}

pub fn default_max_delay() -> u64 {
    30_000
}

pub fn default_max_attempts() -> u32 {
    5
}

pub fn default_health_check_interval() -> u64 {
    30
}
