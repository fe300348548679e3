use std::sync::Arc;

use shared::types::event::{EventKind, NotificationEvent};
use shared::types::notification::{Notification, NotificationKind};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::api::NotificationsApi;
use crate::dispatcher::Listener;
use crate::error::{ApiError, ClientError};
use crate::manager::ConnectionManager;
use crate::store::{NotificationStore, StoreUpdate};

const TOAST_CAPACITY: usize = 64;

/// Events a synced store listens for.
const SYNCED_KINDS: [EventKind; 5] = [
    EventKind::Notification,
    EventKind::NotificationRead,
    EventKind::NotificationDeleted,
    EventKind::NotificationsCleared,
    EventKind::ConnectionStatus,
];

/// Transient user-facing alert for a newly arrived notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl From<&Notification> for Toast {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            kind: n.kind.clone(),
            title: n.title.clone(),
            message: n.message.clone(),
        }
    }
}

enum Command {
    /// From the push link.
    Push(StoreUpdate),
    /// Confirmed by a successful API call.
    Applied(StoreUpdate),
    Connected(bool),
    Refresh(Option<oneshot::Sender<()>>),
    PullDone {
        generation: u64,
        result: Result<Vec<Notification>, ApiError>,
    },
    Flush(oneshot::Sender<()>),
}

/// Keeps a local [`NotificationStore`] consistent with push events and
/// authoritative pulls.
///
/// One task owns the store and handles every update in mailbox order, so a
/// push landing while a pull is in flight is never lost: it is applied
/// immediately, remembered, and applied again on top of the pull result.
#[derive(Clone)]
pub struct StoreSync {
    commands: mpsc::UnboundedSender<Command>,
    api: Arc<dyn NotificationsApi>,
    store: watch::Receiver<NotificationStore>,
    connected: watch::Receiver<bool>,
    toasts: broadcast::Sender<Toast>,
    listener: Listener,
}

impl StoreSync {
    /// Start the sync task and its initial pull.
    pub fn spawn(api: Arc<dyn NotificationsApi>) -> Self {
        let (commands, mailbox) = mpsc::unbounded_channel();
        let (store_tx, store) = watch::channel(NotificationStore::new());
        let (connected_tx, connected) = watch::channel(false);
        let (toasts, _) = broadcast::channel(TOAST_CAPACITY);

        let actor = SyncActor {
            api: api.clone(),
            mailbox: commands.downgrade(),
            store: store_tx,
            connected: connected_tx,
            toasts: toasts.clone(),
            generation: 0,
            journal: None,
            waiters: Vec::new(),
        };
        tokio::spawn(actor.run(mailbox));

        let forward = commands.clone();
        let listener = Listener::new(move |event| {
            if let Some(command) = command_for(event) {
                forward
                    .send(command)
                    .map_err(|_| anyhow::anyhow!("store sync task has stopped"))?;
            }
            Ok(())
        });

        let _ = commands.send(Command::Refresh(None));

        Self {
            commands,
            api,
            store,
            connected,
            toasts,
            listener,
        }
    }

    /// Follow `manager`'s events.
    pub fn attach(&self, manager: &ConnectionManager) {
        for kind in SYNCED_KINDS {
            manager.subscribe(kind, &self.listener);
        }
    }

    pub fn detach(&self, manager: &ConnectionManager) {
        for kind in SYNCED_KINDS {
            manager.unsubscribe(kind, &self.listener);
        }
    }

    /// Feed one event by hand, as the manager would.
    pub fn ingest(&self, event: &NotificationEvent) -> Result<(), ClientError> {
        match command_for(event) {
            Some(command) => self.send(command),
            None => Ok(()),
        }
    }

    /// Mark one notification read. A notification already read locally is
    /// not sent again.
    pub async fn mark_read(&self, id: &str) -> Result<(), ClientError> {
        if self.store.borrow().get(id).is_some_and(|n| n.is_read) {
            debug!("{} already read", id);
            return Ok(());
        }

        self.api.mark_read(id).await?;
        self.send(Command::Applied(StoreUpdate::Read {
            id: id.to_string(),
            read_at: None,
        }))
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.api.delete(id).await?;
        self.send(Command::Applied(StoreUpdate::Deleted { id: id.to_string() }))
    }

    pub async fn clear_all(&self) -> Result<(), ClientError> {
        self.api.clear_all().await?;
        self.send(Command::Applied(StoreUpdate::Cleared))
    }

    /// Pull the authoritative list and wait until it has been applied (or
    /// has failed and been logged).
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Refresh(Some(tx)))?;
        rx.await.map_err(|_| ClientError::SyncStopped)
    }

    /// Wait until every command sent so far has been handled.
    pub async fn flush(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx))?;
        rx.await.map_err(|_| ClientError::SyncStopped)
    }

    pub fn snapshot(&self) -> NotificationStore {
        self.store.borrow().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.store.borrow().unread_count()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Receiver that is notified on every store change.
    pub fn watch(&self) -> watch::Receiver<NotificationStore> {
        self.store.clone()
    }

    pub fn toasts(&self) -> broadcast::Receiver<Toast> {
        self.toasts.subscribe()
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::SyncStopped)
    }
}

fn command_for(event: &NotificationEvent) -> Option<Command> {
    match event {
        NotificationEvent::ConnectionStatus(up) => Some(Command::Connected(*up)),
        other => StoreUpdate::from_event(other).map(Command::Push),
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct SyncActor {
    api: Arc<dyn NotificationsApi>,
    mailbox: mpsc::WeakUnboundedSender<Command>,
    store: watch::Sender<NotificationStore>,
    connected: watch::Sender<bool>,
    toasts: broadcast::Sender<Toast>,
    /// Generation of the newest pull. Older results are discarded.
    generation: u64,
    /// Updates seen since the newest pull started. `Some` while it is in
    /// flight.
    journal: Option<Vec<StoreUpdate>>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl SyncActor {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = mailbox.recv().await {
            self.handle(command);
        }
        debug!("Store sync stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Push(update) => {
                if self.apply(&update) {
                    if let StoreUpdate::Arrived(notification) = &update {
                        // No receivers is fine.
                        let _ = self.toasts.send(Toast::from(notification));
                    }
                }
                self.remember(update);
            }
            Command::Applied(update) => {
                self.apply(&update);
                self.remember(update);
            }
            Command::Connected(up) => {
                self.connected.send_replace(up);
                if up {
                    self.start_pull(None);
                }
            }
            Command::Refresh(waiter) => self.start_pull(waiter),
            Command::PullDone { generation, result } => self.finish_pull(generation, result),
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn apply(&self, update: &StoreUpdate) -> bool {
        self.store.send_if_modified(|store| store.apply(update))
    }

    fn remember(&mut self, update: StoreUpdate) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(update);
        }
    }

    fn start_pull(&mut self, waiter: Option<oneshot::Sender<()>>) {
        self.generation += 1;
        self.journal = Some(Vec::new());
        self.waiters.extend(waiter);

        let generation = self.generation;
        let api = self.api.clone();
        let mailbox = self.mailbox.clone();
        debug!("Pulling notifications (generation {})", generation);

        tokio::spawn(async move {
            let result = api.fetch_all().await;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(Command::PullDone { generation, result });
            }
        });
    }

    fn finish_pull(&mut self, generation: u64, result: Result<Vec<Notification>, ApiError>) {
        if generation != self.generation {
            debug!("Discarding superseded pull (generation {})", generation);
            return;
        }

        let journal = self.journal.take().unwrap_or_default();
        match result {
            Ok(list) => {
                self.store.send_modify(|store| {
                    store.replace_all(list);
                    for update in &journal {
                        store.apply(update);
                    }
                });
                info!(
                    "Synced {} notifications ({} replayed updates)",
                    self.store.borrow().len(),
                    journal.len()
                );
            }
            Err(e) => warn!("Notification pull failed, keeping local state: {}", e),
        }

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::testing::{FakeApi, notification, settle};

    fn pushed(id: &str) -> NotificationEvent {
        NotificationEvent::Notification(notification(id))
    }

    fn read_event(id: &str) -> NotificationEvent {
        NotificationEvent::NotificationRead {
            id: id.into(),
            read_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single(),
        }
    }

    async fn synced(api: &Arc<FakeApi>) -> StoreSync {
        let sync = StoreSync::spawn(api.clone());
        settle().await;
        sync.flush().await.unwrap();
        sync
    }

    #[tokio::test]
    async fn initial_pull_populates_store() {
        let api = FakeApi::with(vec![notification("a"), notification("b")]);
        let sync = synced(&api).await;

        assert_eq!(sync.snapshot().len(), 2);
        assert_eq!(sync.unread_count(), 2);
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test]
    async fn push_during_pull_survives_the_pull_result() {
        let api = FakeApi::with(vec![notification("a")]);
        let sync = StoreSync::spawn(api.clone());

        // Pull is still in flight; these must not be overwritten by it.
        sync.ingest(&pushed("b")).unwrap();
        sync.ingest(&read_event("a")).unwrap();
        settle().await;
        sync.flush().await.unwrap();

        let store = sync.snapshot();
        let ids: Vec<_> = store.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(store.unread_count(), 1);
    }

    #[tokio::test]
    async fn pull_and_push_orders_converge() {
        let server = vec![notification("n1"), notification("n2")];

        let pull_first = {
            let api = FakeApi::with(server.clone());
            let sync = synced(&api).await;
            sync.ingest(&pushed("n3")).unwrap();
            sync.ingest(&read_event("n1")).unwrap();
            sync.flush().await.unwrap();
            sync.snapshot()
        };

        let push_first = {
            let api = FakeApi::with(server);
            let sync = StoreSync::spawn(api.clone());
            sync.ingest(&pushed("n3")).unwrap();
            sync.ingest(&read_event("n1")).unwrap();
            settle().await;
            sync.flush().await.unwrap();
            sync.snapshot()
        };

        assert_eq!(pull_first, push_first);
        assert_eq!(pull_first.len(), 3);
        assert_eq!(pull_first.unread_count(), 2);
    }

    #[tokio::test]
    async fn reconnect_triggers_a_fresh_pull() {
        let api = FakeApi::with(vec![notification("a")]);
        let sync = synced(&api).await;
        assert!(!sync.is_connected());

        api.set_server(vec![notification("a"), notification("b")]);
        sync.ingest(&NotificationEvent::ConnectionStatus(true)).unwrap();
        settle().await;
        sync.flush().await.unwrap();

        assert!(sync.is_connected());
        assert_eq!(api.fetches(), 2);
        assert_eq!(sync.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_push_neither_grows_store_nor_toasts_twice() {
        let api = FakeApi::with(Vec::new());
        let sync = synced(&api).await;
        let mut toasts = sync.toasts();

        // n1: arrive, duplicate, read (API + echo), clear.
        sync.ingest(&pushed("n1")).unwrap();
        sync.flush().await.unwrap();
        assert_eq!((sync.snapshot().len(), sync.unread_count()), (1, 1));

        sync.ingest(&pushed("n1")).unwrap();
        sync.flush().await.unwrap();
        assert_eq!((sync.snapshot().len(), sync.unread_count()), (1, 1));

        sync.mark_read("n1").await.unwrap();
        sync.ingest(&read_event("n1")).unwrap();
        sync.flush().await.unwrap();
        assert_eq!(sync.unread_count(), 0);

        sync.ingest(&NotificationEvent::NotificationsCleared).unwrap();
        sync.flush().await.unwrap();
        assert_eq!((sync.snapshot().len(), sync.unread_count()), (0, 0));

        assert_eq!(toasts.try_recv().unwrap().id, "n1");
        assert!(toasts.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_state_untouched() {
        let api = FakeApi::with(vec![notification("a")]);
        let sync = synced(&api).await;
        api.fail_mutations();

        let err = sync.delete("a").await.unwrap_err();
        assert!(matches!(err, ClientError::Api(ApiError::Status { .. })));
        assert!(sync.mark_read("a").await.is_err());
        sync.flush().await.unwrap();

        assert_eq!(sync.snapshot().len(), 1);
        assert_eq!(sync.unread_count(), 1);
    }

    #[tokio::test]
    async fn successful_mutations_apply_locally() {
        let api = FakeApi::with(vec![notification("a"), notification("b")]);
        let sync = synced(&api).await;

        sync.mark_read("a").await.unwrap();
        sync.delete("b").await.unwrap();
        sync.flush().await.unwrap();
        assert_eq!(sync.snapshot().len(), 1);
        assert_eq!(sync.unread_count(), 0);

        sync.clear_all().await.unwrap();
        sync.refresh().await.unwrap();
        assert!(sync.snapshot().is_empty());
    }

    #[tokio::test]
    async fn attached_sync_follows_the_manager() {
        use crate::credentials::StaticCredentials;
        use crate::testing::FakeTransport;

        let transport = FakeTransport::new();
        let manager = ConnectionManager::builder(transport.clone(), Arc::new(StaticCredentials::new("t")))
            .build();
        let api = FakeApi::with(Vec::new());
        let sync = synced(&api).await;
        sync.attach(&manager);

        manager.start().await;
        transport.push(
            "notification",
            r#"{"id":"n9","type":"user_invited","title":"t","message":"m","userId":"u-1"}"#,
        );
        settle().await;
        sync.flush().await.unwrap();
        assert!(sync.is_connected());
        assert!(sync.snapshot().contains("n9"));

        sync.detach(&manager);
        manager.stop();
        settle().await;
        sync.flush().await.unwrap();
        assert!(sync.is_connected(), "detached sync no longer follows status");
    }
}
