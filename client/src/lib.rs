//! Real-time notification delivery client.
//!
//! One [`ConnectionManager`] per process owns the live push link, retries it
//! with capped exponential backoff, watches its health, and fans normalized
//! events out through a [`Dispatcher`]. [`StoreSync`] keeps a local
//! notification collection consistent with both push events and pulls from
//! the REST API.

pub mod api;
pub mod backoff;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod store;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{HttpNotificationsApi, NotificationsApi};
pub use backoff::ReconnectPolicy;
pub use credentials::{CredentialProvider, StaticCredentials, TokenStore};
pub use dispatcher::{Dispatcher, Listener};
pub use error::{ApiError, ClientError, TransportError};
pub use manager::{ConnectionManager, ConnectionState};
pub use store::{NotificationStore, StoreUpdate};
pub use sync::{StoreSync, Toast};
pub use transport::{Link, LinkState, Transport, sse::SseTransport};
