use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::types::notification::Notification;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Key for everything owned by one user within one tenant.
pub fn scope_key(tenant_id: &str, user_id: &str) -> String {
    format!("{}:{}", tenant_id, user_id)
}

/// In-memory notification storage, newest first per scope.
#[derive(Debug, Default)]
pub struct NotificationRepo {
    scopes: RwLock<HashMap<String, Vec<Notification>>>,
}

impl NotificationRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self, scope: &str) -> Vec<Notification> {
        let scopes = self.scopes.read().await;
        scopes.get(scope).cloned().unwrap_or_default()
    }

    pub async fn unread(&self, scope: &str) -> Vec<Notification> {
        let scopes = self.scopes.read().await;
        scopes
            .get(scope)
            .map(|items| items.iter().filter(|n| !n.is_read).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn insert(&self, scope: &str, notification: Notification) {
        let mut scopes = self.scopes.write().await;
        debug!("Storing notification {} for {}", notification.id, scope);
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(0, notification);
    }

    /// Returns the read timestamp, or `None` if no such notification exists.
    /// Marking twice keeps the first timestamp.
    pub async fn mark_read(&self, scope: &str, id: &str) -> Option<DateTime<Utc>> {
        let mut scopes = self.scopes.write().await;
        let notification = scopes.get_mut(scope)?.iter_mut().find(|n| n.id == id)?;
        let now = Utc::now();
        notification.mark_read(now);
        notification.updated_at = Some(now);
        notification.read_at
    }

    pub async fn delete(&self, scope: &str, id: &str) -> bool {
        let mut scopes = self.scopes.write().await;
        let Some(items) = scopes.get_mut(scope) else {
            return false;
        };
        let before = items.len();
        items.retain(|n| n.id != id);
        before != items.len()
    }

    /// Returns how many notifications were removed.
    pub async fn clear(&self, scope: &str) -> usize {
        let mut scopes = self.scopes.write().await;
        let removed = scopes.remove(scope).map(|items| items.len()).unwrap_or(0);
        info!("Cleared {} notifications for {}", removed, scope);
        removed
    }
}

#[cfg(test)]
mod tests {
    use shared::types::notification::NotificationKind;

    use super::*;

    fn notification(id: &str) -> Notification {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "type": NotificationKind::PaymentReminder.as_str(),
            "title": "Invoice due",
            "message": "Pay by Friday",
            "userId": "u-1",
            "tenantId": "acme",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let repo = NotificationRepo::new();
        repo.insert(&scope_key("acme", "u-1"), notification("a")).await;
        repo.insert(&scope_key("acme", "u-2"), notification("b")).await;

        let mine = repo.list(&scope_key("acme", "u-1")).await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "a");
        assert!(!repo.delete(&scope_key("acme", "u-1"), "b").await);
    }

    #[tokio::test]
    async fn mark_read_keeps_first_timestamp() {
        let repo = NotificationRepo::new();
        let scope = scope_key("acme", "u-1");
        repo.insert(&scope, notification("a")).await;

        let first = repo.mark_read(&scope, "a").await;
        assert!(first.is_some());
        assert_eq!(repo.mark_read(&scope, "a").await, first);
        assert!(repo.unread(&scope).await.is_empty());
        assert!(repo.mark_read(&scope, "missing").await.is_none());
    }

    #[tokio::test]
    async fn clear_reports_removed_count() {
        let repo = NotificationRepo::new();
        let scope = scope_key("acme", "u-1");
        repo.insert(&scope, notification("a")).await;
        repo.insert(&scope, notification("b")).await;

        assert_eq!(repo.list(&scope).await[0].id, "b");
        assert_eq!(repo.clear(&scope).await, 2);
        assert_eq!(repo.clear(&scope).await, 0);
    }
}
