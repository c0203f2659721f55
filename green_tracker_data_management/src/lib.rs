use std::{fmt, path::PathBuf};

use const_format::concatcp;

pub mod database;
pub mod history_store;
pub mod export;
mod data_manager;

pub use data_manager::*;

pub const DATA_DIR: &str = "data/";
pub const DATABASE_PATH: &str = concatcp!(DATA_DIR, "snapshots.db");
pub const HISTORY_PATH: &str = concatcp!(DATA_DIR, "history.json");

/// Newest entries kept in the local history.
pub const HISTORY_CAPACITY: usize = 200;

#[derive(Debug)]
pub enum DataManagerError {
    Database(String),
    History(String),
    Export(String),
    /// No durable store is configured.
    Unconfigured,
}

impl fmt::Display for DataManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataManagerError::Database(msg) => write!(f, "Database error: {msg}"),
            DataManagerError::History(msg) => write!(f, "History error: {msg}"),
            DataManagerError::Export(msg) => write!(f, "Export error: {msg}"),
            DataManagerError::Unconfigured => write!(f, "No durable store configured"),
        }
    }
}

impl std::error::Error for DataManagerError {}

/// Resolves a path relative to the project root, falling back to the working directory.
pub fn data_path(relative: &str) -> PathBuf {
    match project_root::get_project_root() {
        Ok(root) => root.join(relative),
        Err(_) => PathBuf::from(relative),
    }
}
