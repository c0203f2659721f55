pub const SNAPSHOTS_TABLE_NAME: &str = "Snapshots";
pub const SNAPSHOT_ID: &str = "snapshot_id";
pub const USER_ID: &str = "user_id";
pub const CREATED_AT: &str = "created_at";
pub const STARTED_AT: &str = "started_at";
pub const STOPPED_AT: &str = "stopped_at";
pub const DISTANCE_METERS: &str = "distance_meters";
pub const DURATION_SEC: &str = "duration_sec";
pub const AVG_SPEED: &str = "avg_speed";
pub const MODE: &str = "mode";
pub const KG_CO2: &str = "kg_co2";
pub const COST: &str = "cost";
pub const POINTS: &str = "points";
