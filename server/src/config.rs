use std::path::PathBuf;

pub const DEFAULT_LIVE_ADDR: &str = "0.0.0.0:4000";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:4080";
pub const DEFAULT_LOG_DIR: &str = "server/log";

/// Relay settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub live_addr: String,
    pub http_addr: String,
    /// Without a database the relay acknowledges saves but keeps nothing.
    pub database: Option<PathBuf>,
    pub log_dir: PathBuf,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            live_addr: non_empty("GREEN_TRACKER_LIVE_ADDR").unwrap_or_else(|| DEFAULT_LIVE_ADDR.to_string()),
            http_addr: non_empty("GREEN_TRACKER_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            database: non_empty("GREEN_TRACKER_DATABASE").map(PathBuf::from),
            log_dir: non_empty("GREEN_TRACKER_LOG_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        }
    }
}
