mod notifications;

pub use notifications::{NotificationRepo, scope_key};
