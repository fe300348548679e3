pub mod notifications;
pub mod routes;
pub mod utils;
