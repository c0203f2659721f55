use std::{path::PathBuf, time::Duration};

use green_tracker_data_management::{data_path, HISTORY_PATH};
use green_tracker_lib::comms::ACK_TIMEOUT_MS;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4000";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// `host:port` of the relay's live endpoint.
    pub endpoint: String,
    pub history_path: PathBuf,
    pub ack_timeout: Duration,
    pub user_id: Option<String>,
    /// Replacement coefficient table, JSON.
    pub coefficients: Option<PathBuf>,
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ack_timeout_ms = match non_empty("GREEN_TRACKER_ACK_TIMEOUT_MS").map(|v| v.parse::<u64>()) {
            Some(Ok(ms)) => ms,
            Some(Err(e)) => {
                tracing::warn!("Invalid GREEN_TRACKER_ACK_TIMEOUT_MS ({e}), using {ACK_TIMEOUT_MS}");
                ACK_TIMEOUT_MS
            }
            None => ACK_TIMEOUT_MS,
        };

        Self {
            endpoint: endpoint_address(&non_empty("GREEN_TRACKER_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())),
            history_path: non_empty("GREEN_TRACKER_HISTORY").map(PathBuf::from).unwrap_or_else(|| data_path(HISTORY_PATH)),
            ack_timeout: Duration::from_millis(ack_timeout_ms),
            user_id: non_empty("GREEN_TRACKER_USER_ID"),
            coefficients: non_empty("GREEN_TRACKER_COEFFICIENTS").map(PathBuf::from),
        }
    }
}

/// Reduces an endpoint URL to the `host:port` the live channel connects to.
pub fn endpoint_address(endpoint: &str) -> String {
    let without_scheme = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    without_scheme.trim_end_matches('/').split('/').next().unwrap_or_default().to_string()
}
