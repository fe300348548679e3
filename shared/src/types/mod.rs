pub mod client_config;
pub mod event;
pub mod json_error;
pub mod notification;
pub mod server_config;
pub mod sse;

pub use self::client_config::ClientConfig;
pub use self::event::{EventError, EventKind, NotificationEvent};
pub use self::json_error::ErrorResponse;
pub use self::notification::{NewNotification, Notification, NotificationKind, NotificationList};
pub use self::server_config::PushServerConfig;
pub use self::sse::{SseDecoder, SseFrame};
