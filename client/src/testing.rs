//! Scripted doubles for the transport and the notifications API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use hyper::StatusCode;
use shared::types::event::NotificationEvent;
use shared::types::notification::{Notification, NotificationKind};
use shared::types::sse::SseFrame;
use tokio::sync::mpsc;

use crate::api::NotificationsApi;
use crate::dispatcher::Listener;
use crate::error::{ApiError, TransportError};
use crate::transport::{Link, LinkState, Transport};

pub(crate) fn notification(id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        kind: NotificationKind::SystemUpdate,
        title: format!("title {}", id),
        message: format!("message {}", id),
        data: Default::default(),
        is_read: false,
        read_at: None,
        user_id: "u-1".into(),
        tenant_id: "t-1".into(),
        created_at: None,
        updated_at: None,
        deleted_at: None,
        expires_at: None,
        is_action_required: false,
        action_url: None,
        metadata: None,
    }
}

/// Let spawned tasks run until they block on something other than the
/// scheduler.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

type FrameSender = mpsc::UnboundedSender<Result<SseFrame, TransportError>>;

#[derive(Default)]
struct FakeState {
    refusals: usize,
    hangs: usize,
    connects: usize,
    links: Vec<(FrameSender, LinkState)>,
}

/// Accepts every connect unless told to refuse or hang on the next few. Each accepted
/// link is driven by hand through the methods below.
#[derive(Default)]
pub(crate) struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn refuse_next(&self, count: usize) {
        self.state.lock().unwrap().refusals = count;
    }

    /// The next `count` connects never resolve, like an endpoint that
    /// accepts the socket and never answers.
    pub(crate) fn hang_next(&self, count: usize) {
        self.state.lock().unwrap().hangs = count;
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub(crate) fn links(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    /// Send a raw frame on link `index`. Returns false if that link's
    /// reader is gone.
    pub(crate) fn push_on(&self, index: usize, event: &str, data: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.links[index]
            .0
            .send(Ok(SseFrame::new(event, data)))
            .is_ok()
    }

    pub(crate) fn push(&self, event: &str, data: &str) -> bool {
        let last = self.links() - 1;
        self.push_on(last, event, data)
    }

    /// End the newest link the way a server close does.
    pub(crate) fn drop_link(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some((sender, link)) = state.links.last_mut() {
            link.mark_closed();
            let _ = sender.send(Err(TransportError::HeartbeatTimeout(Duration::from_secs(60))));
        }
    }

    /// Mark the newest link closed without ending its stream.
    pub(crate) fn fail_silently(&self) {
        let state = self.state.lock().unwrap();
        if let Some((_, link)) = state.links.last() {
            link.mark_closed();
        }
    }
}

impl Transport for FakeTransport {
    fn connect<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<Link, TransportError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;

            let hang = {
                let mut state = self.state.lock().unwrap();
                let hang = state.hangs > 0;
                if hang {
                    state.hangs -= 1;
                    state.connects += 1;
                }
                hang
            };
            if hang {
                return futures_util::future::pending().await;
            }

            let mut state = self.state.lock().unwrap();
            state.connects += 1;
            if state.refusals > 0 {
                state.refusals -= 1;
                return Err(TransportError::Status(StatusCode::SERVICE_UNAVAILABLE));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let link = LinkState::open();
            state.links.push((tx, link.clone()));

            let frames = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            Ok(Link {
                frames: Box::pin(frames),
                state: link,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Notifications API
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ApiState {
    server: Vec<Notification>,
    fail_mutations: bool,
    fetches: usize,
}

/// In-memory stand-in for the REST endpoints.
#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    pub(crate) fn with(server: Vec<Notification>) -> Arc<Self> {
        let api = Self::default();
        api.state.lock().unwrap().server = server;
        Arc::new(api)
    }

    pub(crate) fn set_server(&self, server: Vec<Notification>) {
        self.state.lock().unwrap().server = server;
    }

    pub(crate) fn fail_mutations(&self) {
        self.state.lock().unwrap().fail_mutations = true;
    }

    pub(crate) fn fetches(&self) -> usize {
        self.state.lock().unwrap().fetches
    }

    fn mutate(&self, apply: impl FnOnce(&mut Vec<Notification>)) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mutations {
            return Err(ApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "INTERNAL_ERROR: try again".into(),
            });
        }
        apply(&mut state.server);
        Ok(())
    }
}

impl NotificationsApi for FakeApi {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<Notification>, ApiError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let mut state = self.state.lock().unwrap();
            state.fetches += 1;
            Ok(state.server.clone())
        })
    }

    fn fetch_unread(&self) -> BoxFuture<'_, Result<Vec<Notification>, ApiError>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(state.server.iter().filter(|n| !n.is_read).cloned().collect())
        })
    }

    fn mark_read<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.mutate(|server| {
                if let Some(n) = server.iter_mut().find(|n| n.id == id) {
                    n.is_read = true;
                }
            })
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move { self.mutate(|server| server.retain(|n| n.id != id)) })
    }

    fn clear_all(&self) -> BoxFuture<'_, Result<(), ApiError>> {
        Box::pin(async move { self.mutate(Vec::clear) })
    }
}

// ---------------------------------------------------------------------------
// Listener that records what it saw
// ---------------------------------------------------------------------------

pub(crate) fn recorder() -> (Listener, Arc<Mutex<Vec<NotificationEvent>>>) {
    let seen: Arc<Mutex<Vec<NotificationEvent>>> = Arc::default();
    let sink = seen.clone();
    let listener = Listener::new(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    (listener, seen)
}
