//! Concrete adapter implementations for ports.

pub mod argon2_credentials;
pub mod file_config_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(any(feature = "web-sqlite", feature = "web-postgres"))]
pub mod web;
pub mod yahoo_quote_adapter;

use std::sync::Arc;

use crate::domain::error::FireError;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::LedgerStore;

#[cfg(feature = "sqlite")]
const DEFAULT_BACKEND: &str = "sqlite";
#[cfg(not(feature = "sqlite"))]
const DEFAULT_BACKEND: &str = "postgres";

/// Opens the store named by `[database] backend`. The schema is not touched.
pub fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn LedgerStore>, FireError> {
    let backend = config
        .get_string("database", "backend")
        .map(|b| b.trim().to_lowercase())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_BACKEND.to_string());

    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(sqlite_adapter::SqliteAdapter::from_config(config)?)),
        #[cfg(feature = "postgres")]
        "postgres" => Ok(Arc::new(postgres_adapter::PostgresAdapter::from_config(
            config,
        )?)),
        other => Err(FireError::ConfigInvalid {
            section: "database".into(),
            key: "backend".into(),
            reason: format!("backend '{other}' is not available in this build"),
        }),
    }
}
