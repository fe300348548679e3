pub mod sse;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use shared::types::sse::SseFrame;

use crate::error::TransportError;

/// Raw frames as they come off a live link. The stream ends when the link
/// does; an `Err` item is the reason it ended.
pub type FrameStream = BoxStream<'static, Result<SseFrame, TransportError>>;

/// Open/closed flag of one live link, shared between the transport (which
/// clears it when the connection dies) and its owner (which clears it on
/// close).
#[derive(Debug, Clone)]
pub struct LinkState(Arc<AtomicBool>);

impl LinkState {
    pub fn open() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A live push connection. Dropping `frames` tears the connection down.
pub struct Link {
    pub frames: FrameStream,
    pub state: LinkState,
}

/// Opens push links. Injected into the connection manager so tests can
/// substitute a scripted transport.
pub trait Transport: Send + Sync {
    fn connect<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Link, TransportError>>;
}
