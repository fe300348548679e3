use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared::types::event::NotificationEvent;
use shared::types::notification::Notification;

/// A state change to the local collection, from either the push link or a
/// successful API call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUpdate {
    Arrived(Notification),
    Read {
        id: String,
        read_at: Option<DateTime<Utc>>,
    },
    Deleted {
        id: String,
    },
    Cleared,
}

impl StoreUpdate {
    pub fn from_event(event: &NotificationEvent) -> Option<Self> {
        match event {
            NotificationEvent::Notification(n) => Some(Self::Arrived(n.clone())),
            NotificationEvent::NotificationRead { id, read_at } => Some(Self::Read {
                id: id.clone(),
                read_at: *read_at,
            }),
            NotificationEvent::NotificationDeleted { id } => Some(Self::Deleted { id: id.clone() }),
            NotificationEvent::NotificationsCleared => Some(Self::Cleared),
            NotificationEvent::ConnectionStatus(_) | NotificationEvent::Broadcast(_) => None,
        }
    }
}

/// The user's notifications, newest first, unique by id.
///
/// The unread count is always derived from the items, never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationStore {
    items: Vec<Notification>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Replace everything with an authoritative list. Later duplicates of an
    /// id are dropped.
    pub fn replace_all(&mut self, list: Vec<Notification>) {
        let mut seen = HashSet::new();
        self.items = list
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect();
    }

    /// Apply one update. Returns whether anything changed.
    ///
    /// Updates naming an id that is not present are no-ops, and a second
    /// arrival of the same id is ignored.
    pub fn apply(&mut self, update: &StoreUpdate) -> bool {
        match update {
            StoreUpdate::Arrived(notification) => {
                if self.contains(&notification.id) {
                    return false;
                }
                self.items.insert(0, notification.clone());
                true
            }
            StoreUpdate::Read { id, read_at } => {
                match self.items.iter_mut().find(|n| n.id == *id) {
                    Some(n) if !n.is_read => {
                        n.mark_read(read_at.unwrap_or_else(Utc::now));
                        true
                    }
                    _ => false,
                }
            }
            StoreUpdate::Deleted { id } => {
                let before = self.items.len();
                self.items.retain(|n| n.id != *id);
                self.items.len() != before
            }
            StoreUpdate::Cleared => {
                let changed = !self.items.is_empty();
                self.items.clear();
                changed
            }
        }
    }
}
