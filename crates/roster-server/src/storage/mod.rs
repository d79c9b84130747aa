//! Storage layer
//!
//! SQLite (embedded) is the persistent backend. The in-memory store keeps
//! the same contract for ephemeral runs and tests.

pub mod db;
pub mod memory;

pub use db::Database;
pub use memory::MemoryStore;

use crate::config::{Config, StorageBackend};
use anyhow::Result;
use roster_core::Repository;
use std::sync::Arc;
use tracing::info;

/// Build the repository selected by configuration
pub async fn open(config: &Config) -> Result<Arc<dyn Repository>> {
    match config.storage {
        StorageBackend::Sqlite => {
            let path = config.database_path();
            let db = Database::new(&path).await?;
            info!("SQLite database ready at: {}", path.display());
            Ok(Arc::new(db))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage, data will not survive restarts");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
