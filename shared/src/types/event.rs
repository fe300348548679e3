use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;

use crate::types::notification::Notification;

/// Fields an inbound `notification` payload must carry as strings.
const REQUIRED_NOTIFICATION_FIELDS: [&str; 5] = ["id", "type", "title", "message", "userId"];

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// Name under which listeners register. One per [`NotificationEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Notification,
    NotificationRead,
    NotificationDeleted,
    NotificationsCleared,
    ConnectionStatus,
    Broadcast,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Notification,
        EventKind::NotificationRead,
        EventKind::NotificationDeleted,
        EventKind::NotificationsCleared,
        EventKind::ConnectionStatus,
        EventKind::Broadcast,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::NotificationRead => "notification_read",
            Self::NotificationDeleted => "notification_deleted",
            Self::NotificationsCleared => "notifications_cleared",
            Self::ConnectionStatus => "connection_status",
            Self::Broadcast => "broadcast",
        }
    }

    /// Map an SSE event name to a kind. `connection_status` is produced
    /// locally and never accepted from the wire.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "notification" => Some(Self::Notification),
            "notification_read" => Some(Self::NotificationRead),
            "notification_deleted" => Some(Self::NotificationDeleted),
            "notifications_cleared" => Some(Self::NotificationsCleared),
            "broadcast" => Some(Self::Broadcast),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A normalized push event with its parsed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Notification(Notification),
    NotificationRead {
        id: String,
        read_at: Option<DateTime<Utc>>,
    },
    NotificationDeleted {
        id: String,
    },
    NotificationsCleared,
    ConnectionStatus(bool),
    /// Tenant-wide announcement; the payload is passed through untouched.
    Broadcast(Value),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid JSON in {event} payload: {source}")]
    Json {
        event: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{event} payload is missing required field `{field}`")]
    MissingField {
        event: EventKind,
        field: &'static str,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Notification(_) => EventKind::Notification,
            Self::NotificationRead { .. } => EventKind::NotificationRead,
            Self::NotificationDeleted { .. } => EventKind::NotificationDeleted,
            Self::NotificationsCleared => EventKind::NotificationsCleared,
            Self::ConnectionStatus(_) => EventKind::ConnectionStatus,
            Self::Broadcast(_) => EventKind::Broadcast,
        }
    }

    /// Decode one wire event.
    ///
    /// Returns `Ok(None)` for event names this client does not consume
    /// (`connected`, heartbeats, ...). Returns an error when a consumed event
    /// carries a payload that cannot be trusted.
    pub fn decode(name: &str, data: &str) -> Result<Option<Self>, EventError> {
        let Some(kind) = EventKind::from_wire(name) else {
            return Ok(None);
        };

        let event = match kind {
            EventKind::Notification => Self::Notification(decode_notification(parse(kind, data)?)?),
            EventKind::NotificationRead => {
                let value = parse(kind, data)?;
                let read_at = value
                    .get("readAt")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                Self::NotificationRead {
                    id: target_id(kind, &value)?,
                    read_at,
                }
            }
            EventKind::NotificationDeleted => Self::NotificationDeleted {
                id: target_id(kind, &parse(kind, data)?)?,
            },
            EventKind::NotificationsCleared => Self::NotificationsCleared,
            EventKind::Broadcast => Self::Broadcast(parse(kind, data)?),
            EventKind::ConnectionStatus => return Ok(None),
        };

        Ok(Some(event))
    }

    /// Wire name and payload for this event. `ConnectionStatus` is local
    /// only and has no wire form.
    pub fn to_wire(&self) -> Option<(&'static str, Value)> {
        let payload = match self {
            Self::Notification(n) => serde_json::to_value(n).ok()?,
            Self::NotificationRead { id, read_at } => json!({ "id": id, "readAt": read_at }),
            Self::NotificationDeleted { id } => json!({ "id": id }),
            Self::NotificationsCleared => json!({}),
            Self::Broadcast(value) => value.clone(),
            Self::ConnectionStatus(_) => return None,
        };
        Some((self.kind().as_str(), payload))
    }
}

fn parse(kind: EventKind, data: &str) -> Result<Value, EventError> {
    serde_json::from_str(data).map_err(|source| EventError::Json { event: kind, source })
}

fn decode_notification(value: Value) -> Result<Notification, EventError> {
    let kind = EventKind::Notification;
    for field in REQUIRED_NOTIFICATION_FIELDS {
        if !value.get(field).is_some_and(Value::is_string) {
            return Err(EventError::MissingField { event: kind, field });
        }
    }
    if value["id"].as_str().is_some_and(str::is_empty) {
        return Err(EventError::MissingField { event: kind, field: "id" });
    }
    serde_json::from_value(value).map_err(|source| EventError::Json { event: kind, source })
}

/// Read/delete payloads name their target either as a bare string or as
/// `{ "id": ... }`.
fn target_id(kind: EventKind, value: &Value) -> Result<String, EventError> {
    let id = match value {
        Value::String(id) => Some(id.as_str()),
        Value::Object(map) => map.get("id").and_then(Value::as_str),
        _ => None,
    };
    id.filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(EventError::MissingField { event: kind, field: "id" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_names_are_ignored() {
        assert!(NotificationEvent::decode("connected", "{}").unwrap().is_none());
        assert!(NotificationEvent::decode("heartbeat", "not json").unwrap().is_none());
    }

    #[test]
    fn connection_status_is_never_read_from_the_wire() {
        assert!(EventKind::from_wire("connection_status").is_none());
    }

    #[test]
    fn read_event_accepts_bare_id() {
        let event = NotificationEvent::decode("notification_read", r#""n1""#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            NotificationEvent::NotificationRead { id: "n1".into(), read_at: None }
        );
    }

    #[test]
    fn deleted_event_without_id_is_rejected() {
        let err = NotificationEvent::decode("notification_deleted", r#"{"other":1}"#).unwrap_err();
        assert!(matches!(err, EventError::MissingField { field: "id", .. }));
    }

    #[test]
    fn cleared_ignores_payload() {
        let event = NotificationEvent::decode("notifications_cleared", "")
            .unwrap()
            .unwrap();
        assert_eq!(event, NotificationEvent::NotificationsCleared);
    }
}
