use std::{path::{Path, PathBuf}, sync::Arc};

use green_tracker_lib::history::HistoryRecord;
use tokio::sync::Mutex;

use crate::{DataManagerError, HISTORY_CAPACITY};

/**
 * The local fallback store. Every completed trip lands here, whatever the relay says.
 * Records are kept newest first and trimmed to a fixed capacity; appends are
 * serialized by the mutex so the trim and the file write happen together.
 */
#[derive(Clone)]
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
    records: Arc<Mutex<Vec<HistoryRecord>>>,
}

impl HistoryStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DataManagerError> {
        Self::open_with_capacity(path, HISTORY_CAPACITY).await
    }

    pub async fn open_with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self, DataManagerError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await
                    .map_err(|_| DataManagerError::History(format!("Failed to create history directory: {:?}", parent)))?;
            }
        }

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<HistoryRecord>>(&bytes) {
                Ok(mut records) => {
                    records.truncate(capacity);
                    records
                }
                Err(err) => {
                    tracing::warn!("History file {:?} is unreadable, starting empty: {err}", path);
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(DataManagerError::History(format!("Failed to read history file {:?}: {err}", path))),
        };

        tracing::debug!("Loaded {} history records from {:?}", records.len(), path);

        Ok(Self {
            path,
            capacity,
            records: Arc::new(Mutex::new(records)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Puts the record first, drops the oldest beyond capacity and persists.
    pub async fn append(&self, record: HistoryRecord) -> Result<(), DataManagerError> {
        let mut records = self.records.lock().await;
        records.insert(0, record);
        records.truncate(self.capacity);
        self.write(&records).await
    }

    pub async fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn clear(&self) -> Result<(), DataManagerError> {
        let mut records = self.records.lock().await;
        records.clear();
        self.write(&records).await
    }

    // Write to a sibling file and rename, so a crash never leaves half a history behind.
    async fn write(&self, records: &[HistoryRecord]) -> Result<(), DataManagerError> {
        let bytes = serde_json::to_vec(records)
            .map_err(|e| DataManagerError::History(format!("Failed to serialize history: {e}")))?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, bytes).await
            .map_err(|e| DataManagerError::History(format!("Failed to write history file {:?}: {e}", tmp_path)))?;
        tokio::fs::rename(&tmp_path, &self.path).await
            .map_err(|e| DataManagerError::History(format!("Failed to replace history file {:?}: {e}", self.path)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use green_tracker_lib::{snapshot::Snapshot, transport_mode::TransportMode};

    fn temp_history_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("green_tracker_history_{}", rand::random::<u64>()))
            .join("history.json")
    }

    fn record(i: i64) -> HistoryRecord {
        let snapshot = Snapshot::new(i as f64, 1, 1., TransportMode::Walk, 0., 0., Vec::new(), Some(0), Some(1000));
        HistoryRecord::from_live(snapshot, DateTime::<Utc>::from_timestamp(i, 0).unwrap())
    }

    #[tokio::test]
    async fn keeps_newest_first_and_caps() {
        let path = temp_history_path();
        let store = HistoryStore::open_with_capacity(&path, 3).await.unwrap();

        for i in 0..5 {
            store.append(record(i)).await.unwrap();
        }

        let distances: Vec<f64> = store.records().await.iter().map(|r| r.live.as_ref().unwrap().distance_meters).collect();
        assert_eq!(distances, vec![4., 3., 2.]);

        // Survives a reopen
        let reopened = HistoryStore::open_with_capacity(&path, 3).await.unwrap();
        assert_eq!(reopened.records().await, store.records().await);
    }

    #[tokio::test]
    async fn default_capacity_is_two_hundred() {
        let store = HistoryStore::open(temp_history_path()).await.unwrap();
        for i in 0..205 {
            store.append(record(i)).await.unwrap();
        }
        assert_eq!(store.len().await, HISTORY_CAPACITY);
        assert_eq!(store.records().await[0], record(204));
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let path = temp_history_path();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let store = HistoryStore::open(&path).await.unwrap();
        assert!(store.is_empty().await);

        store.append(record(1)).await.unwrap();
        assert_eq!(HistoryStore::open(&path).await.unwrap().len().await, 1);
    }

    #[tokio::test]
    async fn clear_empties_the_file() {
        let path = temp_history_path();
        let store = HistoryStore::open(&path).await.unwrap();
        store.append(record(1)).await.unwrap();
        store.clear().await.unwrap();
        assert!(HistoryStore::open(&path).await.unwrap().is_empty().await);
    }
}
