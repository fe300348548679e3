use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// What a notification is about. Serialized as the snake_case wire string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    SubscriptionChange,
    PaymentReminder,
    UserInvited,
    RoleAssigned,
    ProfileSetup,
    SystemUpdate,
    /// A kind newer than this client; kept verbatim so it still renders.
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionChange => "subscription_change",
            Self::PaymentReminder => "payment_reminder",
            Self::UserInvited => "user_invited",
            Self::RoleAssigned => "role_assigned",
            Self::ProfileSetup => "profile_setup",
            Self::SystemUpdate => "system_update",
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for NotificationKind {
    fn from(value: &str) -> Self {
        match value {
            "subscription_change" => Self::SubscriptionChange,
            "payment_reminder" => Self::PaymentReminder,
            "user_invited" => Self::UserInvited,
            "role_assigned" => Self::RoleAssigned,
            "profile_setup" => Self::ProfileSetup,
            "system_update" => Self::SystemUpdate,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One addressable alert, owned by exactly one user within one tenant.
///
/// `data` is the kind-specific payload (plan details, billing URLs, ...). Its
/// schema is not enforced here; consumers look keys up as they need them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub user_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_action_required: bool,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Notification {
    /// Flip to read. An existing `read_at` is kept so repeated echoes of the
    /// same read do not move the timestamp.
    pub fn mark_read(&mut self, at: DateTime<Utc>) {
        self.is_read = true;
        if self.read_at.is_none() {
            self.read_at = Some(at);
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Look up one key in the kind-specific payload.
    pub fn payload(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

fn null_as_empty_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Request / response wire types
// ---------------------------------------------------------------------------

/// Body of a publish request. The server fills in identity, targeting and
/// timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub is_action_required: bool,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// List envelope some API revisions wrap collections in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub data: Vec<Notification>,
    pub total: usize,
    pub unread_count: usize,
}

/// A list response as it arrives: either a bare array or the envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NotificationList {
    Bare(Vec<Notification>),
    Envelope(NotificationsResponse),
}

impl NotificationList {
    pub fn into_vec(self) -> Vec<Notification> {
        match self {
            Self::Bare(list) => list,
            Self::Envelope(envelope) => envelope.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_preserved() {
        let kind: NotificationKind = serde_json::from_str(r#""tenant_suspended""#).unwrap();
        assert_eq!(kind, NotificationKind::Other("tenant_suspended".into()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""tenant_suspended""#);
    }

    #[test]
    fn mark_read_keeps_first_timestamp() {
        let mut n: Notification = serde_json::from_value(serde_json::json!({
            "id": "n1", "type": "system_update", "title": "t", "message": "m", "userId": "u1"
        }))
        .unwrap();
        let first = Utc::now();
        n.mark_read(first);
        n.mark_read(first + chrono::Duration::seconds(30));
        assert!(n.is_read);
        assert_eq!(n.read_at, Some(first));
    }

    #[test]
    fn null_data_becomes_empty_map() {
        let n: Notification = serde_json::from_value(serde_json::json!({
            "id": "n1", "type": "user_invited", "title": "t", "message": "m",
            "userId": "u1", "data": null
        }))
        .unwrap();
        assert!(n.data.is_empty());
    }
}
