use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between keep-alive comments on an idle stream.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

/// A bearer token the server accepts, and the user/tenant pair it scopes to.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub user_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushServerConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:1337"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl PushServerConfig {
    pub fn grant_for(&self, token: &str) -> Option<&TokenGrant> {
        self.tokens.iter().find(|grant| grant.token == token)
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_port() -> u16 {
    1337
}

pub fn default_heartbeat() -> u64 {
    15
}
