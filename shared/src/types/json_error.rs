use std::fmt;

use serde::{Deserialize, Serialize};

/// Error body returned by every non-2xx REST response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "A valid bearer token is required")
    }

    pub fn not_found(id: &str) -> Self {
        Self::new("NOT_FOUND", &format!("Notification {} not found", id))
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
