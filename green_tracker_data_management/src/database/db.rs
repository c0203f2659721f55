use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use const_format::concatcp;
use green_tracker_lib::{comms::StopRequest, snapshot::Snapshot, transport_mode::TransportMode};
use serde::Serialize;
use sqlx::{query, query_as, sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow}, Executor, FromRow, Pool, Row, Sqlite};

use crate::{DataManagerError, DocumentStore};

use super::constants::*;

/// A snapshot as the durable store keeps it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    pub id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

impl FromRow<'_, SqliteRow> for StoredSnapshot {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let points: Vec<u8> = row.try_get(POINTS)?;
        let samples = if points.is_empty() {
            Vec::new()
        } else {
            Snapshot::samples_from_blob(&points).map_err(|e| sqlx::Error::Decode(e.into()))?
        };
        let mode: String = row.try_get(MODE)?;
        let duration_sec: i64 = row.try_get(DURATION_SEC)?;

        Ok(Self {
            id: row.try_get::<i64, _>(SNAPSHOT_ID)?.to_string(),
            user_id: row.try_get(USER_ID)?,
            created_at: row.try_get(CREATED_AT)?,
            snapshot: Snapshot {
                distance_meters: row.try_get(DISTANCE_METERS)?,
                duration_sec: duration_sec.max(0) as u64,
                avg_speed_mps: row.try_get(AVG_SPEED)?,
                mode: TransportMode::parse_lenient(&mode),
                kg_co2: row.try_get(KG_CO2)?,
                cost: row.try_get(COST)?,
                samples,
                started_at_ms: row.try_get(STARTED_AT)?,
                stopped_at_ms: row.try_get(STOPPED_AT)?,
            },
        })
    }
}

#[derive(Clone)]
pub struct SnapshotDatabase {
    pool: Pool<Sqlite>,
}

impl SnapshotDatabase {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, DataManagerError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options).await
            .map_err(|e| DataManagerError::Database(format!("Failed to connect to database: {e}")))?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// A private database that lives as long as the pool. Used by tests and dry runs.
    pub async fn connect_in_memory() -> Result<Self, DataManagerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DataManagerError::Database(format!("Bad in-memory options: {e}")))?;

        // Every connection gets its own memory database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options).await
            .map_err(|e| DataManagerError::Database(format!("Failed to open in-memory database: {e}")))?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    pub async fn init(&self) -> Result<(), DataManagerError> {
        self.pool.execute(concatcp!("
            CREATE TABLE IF NOT EXISTS ", SNAPSHOTS_TABLE_NAME, "(",
                SNAPSHOT_ID,     " INTEGER PRIMARY KEY AUTOINCREMENT,",
                USER_ID,         " TEXT,",
                CREATED_AT,      " TIMESTAMP NOT NULL,",
                STARTED_AT,      " INTEGER,",
                STOPPED_AT,      " INTEGER,",
                DISTANCE_METERS, " REAL NOT NULL,",
                DURATION_SEC,    " INTEGER NOT NULL,",
                AVG_SPEED,       " REAL NOT NULL,",
                MODE,            " TEXT NOT NULL,",
                KG_CO2,          " REAL NOT NULL,",
                COST,            " REAL NOT NULL,",
                POINTS,          " BLOB NOT NULL
            )")).await
            .map_err(|e| DataManagerError::Database(format!("Failed to create tables: {e}")))
            .map(|_| ())
    }

    pub async fn insert_snapshot(&self, request: &StopRequest, created_at: DateTime<Utc>) -> Result<i64, DataManagerError> {
        let snapshot = &request.snapshot;
        let points = snapshot.get_samples_blob()
            .map_err(|e| DataManagerError::Database(format!("Failed to encode points: {e}")))?;

        query_as::<_, (i64,)>(concatcp!("
            INSERT INTO ", SNAPSHOTS_TABLE_NAME, "(",
            SNAPSHOT_ID, ", ", USER_ID, ", ", CREATED_AT, ", ", STARTED_AT, ", ", STOPPED_AT, ", ",
            DISTANCE_METERS, ", ", DURATION_SEC, ", ", AVG_SPEED, ", ", MODE, ", ", KG_CO2, ", ", COST, ", ", POINTS, ")
            VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) RETURNING ", SNAPSHOT_ID))
                .bind(request.user_id.as_deref())
                .bind(created_at)
                .bind(snapshot.started_at_ms)
                .bind(snapshot.stopped_at_ms)
                .bind(snapshot.distance_meters)
                .bind(snapshot.duration_sec as i64)
                .bind(snapshot.avg_speed_mps)
                .bind(snapshot.mode.as_str())
                .bind(snapshot.kg_co2)
                .bind(snapshot.cost)
                .bind(points)
                .fetch_one(&self.pool).await
                .map_err(|e| DataManagerError::Database(format!("Failed to insert snapshot: {e}")))
                .map(|row| row.0)
    }

    pub async fn get_snapshot(&self, snapshot_id: i64) -> Result<Option<StoredSnapshot>, DataManagerError> {
        query_as::<_, StoredSnapshot>(concatcp!("SELECT * FROM ", SNAPSHOTS_TABLE_NAME, " WHERE ", SNAPSHOT_ID, " = ?1"))
            .bind(snapshot_id)
            .fetch_optional(&self.pool).await
            .map_err(|e| DataManagerError::Database(format!("Failed to get snapshot {snapshot_id}: {e}")))
    }

    /// Newest first.
    pub async fn get_snapshots(&self, limit: i64) -> Result<Vec<StoredSnapshot>, DataManagerError> {
        query_as::<_, StoredSnapshot>(concatcp!("SELECT * FROM ", SNAPSHOTS_TABLE_NAME, " ORDER BY ", SNAPSHOT_ID, " DESC LIMIT ?1"))
            .bind(limit)
            .fetch_all(&self.pool).await
            .map_err(|e| DataManagerError::Database(format!("Failed to get snapshots: {e}")))
    }

    pub async fn delete_snapshot(&self, snapshot_id: i64) -> Result<bool, DataManagerError> {
        query(concatcp!("DELETE FROM ", SNAPSHOTS_TABLE_NAME, " WHERE ", SNAPSHOT_ID, " = ?1"))
            .bind(snapshot_id)
            .execute(&self.pool).await
            .map_err(|e| DataManagerError::Database(format!("Failed to delete snapshot {snapshot_id}: {e}")))
            .map(|result| result.rows_affected() > 0)
    }

}

#[async_trait]
impl DocumentStore for SnapshotDatabase {
    async fn insert(&self, request: &StopRequest, created_at: DateTime<Utc>) -> Result<String, DataManagerError> {
        self.insert_snapshot(request, created_at).await.map(|id| id.to_string())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredSnapshot>, DataManagerError> {
        // Ids this store never issued simply do not exist.
        let Ok(snapshot_id) = id.parse::<i64>() else {
            return Ok(None);
        };
        self.get_snapshot(snapshot_id).await
    }

    async fn list(&self, limit: i64) -> Result<Vec<StoredSnapshot>, DataManagerError> {
        self.get_snapshots(limit).await
    }

    async fn delete(&self, id: &str) -> Result<bool, DataManagerError> {
        let Ok(snapshot_id) = id.parse::<i64>() else {
            return Ok(false);
        };
        self.delete_snapshot(snapshot_id).await
    }
}
