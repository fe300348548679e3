pub mod config;

pub use self::config::{ConfigError, load_client_config, load_server_config};
