use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use shared::types::event::{EventKind, NotificationEvent};
use shared::types::sse::SseFrame;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::credentials::CredentialProvider;
use crate::dispatcher::{Dispatcher, Listener};
use crate::error::{ClientError, TransportError};
use crate::transport::{FrameStream, Link, LinkState, Transport};

pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static GLOBAL: OnceLock<ConnectionManager> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// The one live link and the reader task draining it.
struct Session {
    reader: JoinHandle<()>,
    link: LinkState,
}

impl Session {
    fn close(self) {
        self.link.mark_closed();
        self.reader.abort();
    }
}

#[derive(Default)]
struct Shared {
    status: ConnectionState,
    /// Set by `start`, cleared by `stop`, a missing credential, or retry
    /// exhaustion. Retries and the watchdog only act while it is set.
    wanted: bool,
    /// Consecutive failed attempts since the last successful connect.
    attempts: u32,
    /// Bumped by every `start`, retry and `stop`. Callbacks carrying an older
    /// value belong to a superseded attempt and are ignored.
    generation: u64,
    session: Option<Session>,
    retry: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl Shared {
    /// Settle into `Disconnected` with no timers left running.
    fn settle(&mut self) {
        self.wanted = false;
        self.status = ConnectionState::Disconnected;
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    dispatcher: Dispatcher,
    policy: ReconnectPolicy,
    health_check_interval: Duration,
    connect_timeout: Duration,
    state: Mutex<Shared>,
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Owns the process's single push link.
///
/// Only the manager touches the transport. Consumers see connection state
/// through [`is_connected`](Self::is_connected) and `connection_status`
/// events, and receive everything else by subscribing listeners.
///
/// Cloning is cheap; clones share one link.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

pub struct ConnectionManagerBuilder {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    policy: ReconnectPolicy,
    health_check_interval: Duration,
    connect_timeout: Duration,
}

impl ConnectionManagerBuilder {
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// How long one connect attempt may take before it counts as failed.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> ConnectionManager {
        ConnectionManager {
            inner: Arc::new(Inner {
                transport: self.transport,
                credentials: self.credentials,
                dispatcher: Dispatcher::new(),
                policy: self.policy,
                health_check_interval: self.health_check_interval,
                connect_timeout: self.connect_timeout,
                state: Mutex::new(Shared::default()),
            }),
        }
    }
}

impl ConnectionManager {
    pub fn builder(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            transport,
            credentials,
            policy: ReconnectPolicy::default(),
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Make this manager the process-wide instance.
    pub fn install_global(self) -> Result<&'static ConnectionManager, ClientError> {
        GLOBAL.set(self).map_err(|_| ClientError::AlreadyInstalled)?;
        GLOBAL.get().ok_or(ClientError::AlreadyInstalled)
    }

    pub fn global() -> Option<&'static ConnectionManager> {
        GLOBAL.get()
    }

    /// Open the push link. A no-op while connected or connecting.
    ///
    /// Without a credential nothing is attempted and the manager stays
    /// disconnected until `start`/`reconnect` is called again. A transport
    /// failure, or a connect that outlives the connect timeout, hands over
    /// to the backoff policy; this call does not wait for retries.
    pub async fn start(&self) {
        self.inner.start().await
    }

    /// Tear the link down and cancel every pending timer. Idempotent; always
    /// emits `connection_status(false)`.
    pub fn stop(&self) {
        self.inner.stop()
    }

    /// `stop` then `start`, with the attempt counter reset.
    pub async fn reconnect(&self) {
        info!("Reconnect requested");
        self.inner.stop();
        self.inner.start().await
    }

    pub fn is_connected(&self) -> bool {
        let shared = self.inner.lock();
        shared.status == ConnectionState::Connected
            && shared.session.as_ref().is_some_and(|s| s.link.is_open())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().status
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn failed_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub fn subscribe(&self, kind: EventKind, listener: &Listener) -> bool {
        self.inner.dispatcher.subscribe(kind, listener.clone())
    }

    pub fn unsubscribe(&self, kind: EventKind, listener: &Listener) -> bool {
        self.inner.dispatcher.unsubscribe(kind, listener)
    }

    #[cfg(test)]
    fn pending_timers(&self) -> (bool, bool) {
        let shared = self.inner.lock();
        let live = |handle: &Option<JoinHandle<()>>| handle.as_ref().is_some_and(|h| !h.is_finished());
        (live(&shared.retry), live(&shared.watchdog))
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    async fn start(self: &Arc<Self>) {
        let generation = {
            let mut shared = self.lock();
            if shared.status != ConnectionState::Disconnected {
                debug!("start ignored: already {:?}", shared.status);
                return;
            }
            shared.wanted = true;
            shared.status = ConnectionState::Connecting;
            shared.generation += 1;
            if shared.watchdog.is_none() {
                shared.watchdog = Some(self.spawn_watchdog());
            }
            shared.generation
        };

        self.open(generation).await;
    }

    fn stop(&self) {
        {
            let mut shared = self.lock();
            shared.generation += 1;
            shared.attempts = 0;
            shared.settle();
            if let Some(session) = shared.session.take() {
                session.close();
            }
        }

        info!("Push link stopped");
        self.dispatcher
            .emit(&NotificationEvent::ConnectionStatus(false));
    }

    async fn open(self: &Arc<Self>, generation: u64) {
        let Some(token) = self.credentials.bearer_token().await else {
            warn!("No valid credential available, not connecting");
            let mut shared = self.lock();
            if shared.generation == generation {
                shared.settle();
            }
            return;
        };

        if !self.is_current(generation) {
            debug!("Connect attempt superseded before it opened");
            return;
        }

        info!("Connecting push link");
        let attempt = time::timeout(self.connect_timeout, self.transport.connect(&token)).await;
        match attempt.unwrap_or_else(|_| Err(TransportError::ConnectTimeout(self.connect_timeout))) {
            Ok(link) => self.on_open(generation, link),
            Err(e) => {
                warn!("Push connect failed: {}", e);
                self.on_link_lost(generation);
            }
        }
    }

    fn on_open(self: &Arc<Self>, generation: u64, link: Link) {
        let Link { frames, state } = link;
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                debug!("Discarding link opened for a superseded attempt");
                state.mark_closed();
                return;
            }

            // Detach any previous handle before the new one can deliver.
            if let Some(old) = shared.session.take() {
                warn!("Replacing a live push link");
                old.close();
            }

            shared.status = ConnectionState::Connected;
            shared.attempts = 0;
            if let Some(retry) = shared.retry.take() {
                retry.abort();
            }

            let reader = tokio::spawn(read_frames(Arc::downgrade(self), generation, frames));
            shared.session = Some(Session {
                reader,
                link: state,
            });
        }

        info!("Push link connected");
        self.dispatcher
            .emit(&NotificationEvent::ConnectionStatus(true));
    }

    /// The attempt for `generation` failed to open or its link dropped.
    fn on_link_lost(self: &Arc<Self>, generation: u64) {
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            if let Some(session) = shared.session.take() {
                session.close();
            }
            shared.status = ConnectionState::Disconnected;

            if !shared.wanted {
                // stop() already ran; nothing to recover.
            } else if !self.policy.allows(shared.attempts) {
                warn!(
                    "Giving up on push link after {} failed attempts",
                    shared.attempts
                );
                shared.settle();
            } else {
                let delay = self.policy.delay_for_attempt(shared.attempts);
                shared.attempts += 1;
                info!(
                    "Scheduling reconnect attempt {}/{} in {:?}",
                    shared.attempts,
                    self.policy.max_attempts(),
                    delay
                );
                shared.retry = Some(self.spawn_retry(generation, delay));
            }
        }

        self.dispatcher
            .emit(&NotificationEvent::ConnectionStatus(false));
    }

    fn spawn_retry(self: &Arc<Self>, generation: u64, delay: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let deadline = Instant::now() + delay;
        tokio::spawn(async move {
            time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.retry_fired(generation).await;
            }
        })
    }

    async fn retry_fired(self: &Arc<Self>, generation: u64) {
        let next = {
            let mut shared = self.lock();
            if shared.generation != generation
                || !shared.wanted
                || shared.status != ConnectionState::Disconnected
            {
                return;
            }
            // This task; dropping the handle detaches it without cancelling.
            shared.retry = None;
            shared.status = ConnectionState::Connecting;
            shared.generation += 1;
            shared.generation
        };

        self.open(next).await;
    }

    // -----------------------------------------------------------------------
    // Health watchdog
    // -----------------------------------------------------------------------

    fn spawn_watchdog(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.needs_recovery() {
                    warn!("Health check: push link is down, reconnecting");
                    // reconnect() stops this watchdog, so it cannot run on
                    // this task.
                    let manager = ConnectionManager { inner };
                    tokio::spawn(async move { manager.reconnect().await });
                }
            }
        })
    }

    /// The link should be up, is not, and nothing is already recovering it.
    fn needs_recovery(&self) -> bool {
        let shared = self.lock();
        if !shared.wanted || shared.status == ConnectionState::Connecting || shared.retry.is_some() {
            return false;
        }
        !shared.session.as_ref().is_some_and(|s| s.link.is_open())
    }

    fn deliver(&self, frame: &SseFrame) {
        match NotificationEvent::decode(&frame.event, &frame.data) {
            Ok(Some(event)) => {
                debug!("Received {}", event.kind());
                self.dispatcher.emit(&event);
            }
            Ok(None) => debug!("Ignoring '{}' event", frame.event),
            Err(e) => warn!("Dropping malformed push event: {}", e),
        }
    }
}

/// Drain one link until it ends, then report the loss.
async fn read_frames(manager: Weak<Inner>, generation: u64, mut frames: FrameStream) {
    while let Some(item) = frames.next().await {
        let Some(inner) = manager.upgrade() else { return };
        if !inner.is_current(generation) {
            debug!("Dropping frame from a stale link");
            return;
        }
        match item {
            Ok(frame) => inner.deliver(&frame),
            Err(e) => {
                warn!("Push link error: {}", e);
                break;
            }
        }
    }

    if let Some(inner) = manager.upgrade() {
        info!("Push link closed");
        inner.on_link_lost(generation);
    }
}
