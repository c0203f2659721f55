use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use green_tracker_lib::comms::StopRequest;

use crate::{database::db::{SnapshotDatabase, StoredSnapshot}, DataManagerError};

/// Most snapshots returned by a listing.
pub const SNAPSHOT_LIST_LIMIT: i64 = 100;

/// A durable home for snapshots. Ids are opaque strings chosen by the store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, request: &StopRequest, created_at: DateTime<Utc>) -> Result<String, DataManagerError>;
    async fn get(&self, id: &str) -> Result<Option<StoredSnapshot>, DataManagerError>;
    /// Newest first.
    async fn list(&self, limit: i64) -> Result<Vec<StoredSnapshot>, DataManagerError>;
    /// False when there was nothing to delete.
    async fn delete(&self, id: &str) -> Result<bool, DataManagerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveReceipt {
    Stored { id: String },
    /// Accepted without a durable store. The id is the server time in milliseconds.
    Unconfigured { id: String },
}

impl SaveReceipt {
    pub fn id(&self) -> &str {
        match self {
            SaveReceipt::Stored { id } | SaveReceipt::Unconfigured { id } => id,
        }
    }
}

/// The relay's interface to snapshot persistence.
#[derive(Clone)]
pub struct DataManager {
    store: Option<Arc<dyn DocumentStore>>,
}

impl DataManager {
    /// Opens the database at `database_path`. Without a path, or when the database
    /// cannot be opened, the manager runs degraded and only acknowledges.
    pub async fn start(database_path: Option<&Path>) -> Self {
        let Some(path) = database_path else {
            tracing::warn!("No database configured, snapshots will not be persisted");
            return Self::unconfigured();
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::error!("Failed to create data directory {:?}: {e}", parent);
                return Self::unconfigured();
            }
        }

        match SnapshotDatabase::connect(path).await {
            Ok(database) => {
                tracing::info!("Persisting snapshots to {:?}", path);
                Self::with_store(Arc::new(database))
            }
            Err(e) => {
                tracing::error!("{e}, continuing without durable store");
                Self::unconfigured()
            }
        }
    }

    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn unconfigured() -> Self {
        Self { store: None }
    }

    pub fn has_durable_store(&self) -> bool {
        self.store.is_some()
    }

    pub async fn save_snapshot(&self, request: &StopRequest) -> Result<SaveReceipt, DataManagerError> {
        let now = Utc::now();
        match &self.store {
            Some(store) => {
                let id = store.insert(request, now).await?;
                Ok(SaveReceipt::Stored { id })
            }
            None => Ok(SaveReceipt::Unconfigured { id: now.timestamp_millis().to_string() }),
        }
    }

    pub async fn get_snapshot(&self, id: &str) -> Result<Option<StoredSnapshot>, DataManagerError> {
        match &self.store {
            Some(store) => store.get(id).await,
            None => Ok(None),
        }
    }

    /// Newest first, without their sample lists.
    pub async fn get_snapshots(&self) -> Result<Vec<StoredSnapshot>, DataManagerError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };

        let mut snapshots = store.list(SNAPSHOT_LIST_LIMIT).await?;
        for stored in snapshots.iter_mut() {
            stored.snapshot.samples.clear();
        }
        Ok(snapshots)
    }

    pub async fn delete_snapshot(&self, id: &str) -> Result<bool, DataManagerError> {
        match &self.store {
            Some(store) => store.delete(id).await,
            None => Ok(false),
        }
    }
}
