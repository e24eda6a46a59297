//! Port traits the domain depends on.

pub mod config_port;
pub mod credential_port;
pub mod quote_port;
pub mod store_port;
