//! Server configuration from flags and environment

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// File-backed SQLite database
    Sqlite,
    /// Process-local store, lost on exit
    Memory,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "roster-server")]
#[command(version, about = "Roster - users, groups and memberships over HTTP", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8000")]
    pub bind_address: SocketAddr,

    /// Directory holding the database file
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Database file, defaults to <data-dir>/roster.db
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Storage backend
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Sqlite)]
    pub storage: StorageBackend,

    /// Log filter directive
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("roster.db"))
    }
}
