mod sse;

pub use sse::{SseManager, handle_sse_subscribe};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shared::types::event::NotificationEvent;

    use super::*;

    fn read(id: &str) -> NotificationEvent {
        NotificationEvent::NotificationRead {
            id: id.to_string(),
            read_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_channel_reuses_channel() {
        let manager = SseManager::new();

        let tx1 = manager.get_channel("acme:alice").await;
        let _rx = tx1.subscribe();
        let tx2 = manager.get_channel("acme:alice").await;

        assert_eq!(tx2.receiver_count(), 1);
        assert_eq!(manager.channels.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_scope() {
        let manager = SseManager::new();
        let mut rx = manager.get_channel("acme:alice").await.subscribe();

        let reached = manager.broadcast_to("acme:alice", read("n1")).await.unwrap();
        assert_eq!(reached, 1);
        assert_eq!(rx.recv().await.unwrap(), read("n1"));
    }

    #[tokio::test]
    async fn test_broadcast_with_no_subscribers() {
        let manager = SseManager::new();
        assert_eq!(manager.broadcast_to("acme:nobody", read("n1")).await.unwrap(), 0);

        // A channel whose streams all went away is not an error either.
        let _tx = manager.get_channel("acme:gone").await;
        assert_eq!(manager.broadcast_to("acme:gone", read("n1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scopes_do_not_leak() {
        let manager = SseManager::new();
        let mut alice = manager.get_channel("acme:alice").await.subscribe();
        let mut bob = manager.get_channel("acme:bob").await.subscribe();

        manager.broadcast_to("acme:bob", read("n1")).await.unwrap();

        assert!(bob.recv().await.is_ok());
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_tenant() {
        let manager = SseManager::new();
        let mut alice = manager.get_channel("acme:alice").await.subscribe();
        let mut bob = manager.get_channel("acme:bob").await.subscribe();
        let mut other = manager.get_channel("globex:carol").await.subscribe();

        let announcement = NotificationEvent::Broadcast(serde_json::json!({ "text": "maintenance" }));
        assert_eq!(manager.broadcast_to_tenant("acme", announcement.clone()).await, 2);

        assert_eq!(alice.recv().await.unwrap(), announcement);
        assert_eq!(bob.recv().await.unwrap(), announcement);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cleanup_removes_inactive() {
        let manager = SseManager::new();

        let _tx1 = manager.get_channel("acme:alice").await;
        let tx2 = manager.get_channel("acme:bob").await;
        let _rx2 = tx2.subscribe();

        manager.cleanup().await;

        let channels = manager.channels.read().await;
        assert!(!channels.contains_key("acme:alice"));
        assert!(channels.contains_key("acme:bob"));
    }

    #[tokio::test]
    async fn test_multiple_streams_same_scope() {
        let manager = SseManager::new();
        let tx = manager.get_channel("acme:alice").await;
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        assert_eq!(manager.broadcast_to("acme:alice", read("n1")).await.unwrap(), 2);
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_broadcasts() {
        let manager = Arc::new(SseManager::new());
        let mut rx = manager.get_channel("acme:alice").await.subscribe();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager.broadcast_to("acme:alice", read(&format!("n{}", i))).await
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.await;
        }

        let mut count = 0;
        while let Ok(Ok(_)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            count += 1;
        }
        assert_eq!(count, 5);
    }
}
