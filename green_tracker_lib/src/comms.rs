use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// Frames longer than this are rejected. A day of 1 Hz samples fits comfortably.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// How long a client waits for `live:stop:ack` before resolving to a timeout.
pub const ACK_TIMEOUT_MS: u64 = 5000;

/// Messages exchanged with the relay. Each frame is one JSON object
/// `{"event": <name>, "data": <payload>}` terminated by a newline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum LiveMessage {
    #[serde(rename = "live:stop")]
    Stop(StopRequest),
    #[serde(rename = "live:stop:ack")]
    StopAck(StopAck),
    #[serde(rename = "live:update")]
    Update(LiveUpdate),
    #[serde(rename = "live:update:ack")]
    UpdateAck(UpdateAck),
    #[serde(rename = "start-tracking")]
    StartTracking(TrackingOptions),
    #[serde(rename = "stop-tracking")]
    StopTracking,
    #[serde(rename = "gps-data")]
    GpsData(GpsData),
}

impl LiveMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            LiveMessage::Stop(_) => "live:stop",
            LiveMessage::StopAck(_) => "live:stop:ack",
            LiveMessage::Update(_) => "live:update",
            LiveMessage::UpdateAck(_) => "live:update:ack",
            LiveMessage::StartTracking(_) => "start-tracking",
            LiveMessage::StopTracking => "stop-tracking",
            LiveMessage::GpsData(_) => "gps-data",
        }
    }
}

/// Outbound `live:stop` payload: the snapshot plus an optional user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Set by the sending channel and echoed in the matching ack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<u64>,
}

impl StopRequest {
    pub fn new(snapshot: Snapshot, user_id: Option<String>) -> Self {
        Self { snapshot, user_id, exchange: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopAck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Accepted, but not written to a durable store.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<u64>,
}

impl StopAck {
    pub fn stored(id: String) -> Self {
        Self { ok: true, id: Some(id), error: None, degraded: false, exchange: None }
    }

    pub fn degraded(id: String) -> Self {
        Self { ok: true, id: Some(id), error: None, degraded: true, exchange: None }
    }

    pub fn failed(error: String) -> Self {
        Self { ok: false, id: None, error: Some(error), degraded: false, exchange: None }
    }

    /// Answers the request that carried `exchange`.
    pub fn answering(mut self, exchange: Option<u64>) -> Self {
        self.exchange = exchange;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUpdate {
    #[serde(default)]
    pub total_distance_meters: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateAck {
    pub ok: bool,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingOptions {
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsData {
    pub latitude: f64,
    pub longitude: f64,
    /// m/s
    pub speed: f64,
}

#[derive(Debug)]
pub enum FrameError {
    TooLong(usize),
    Malformed(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLong(len) => write!(f, "Frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"),
            FrameError::Malformed(msg) => write!(f, "Malformed frame: {msg}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Serializes a message as a single newline terminated line.
pub fn encode_frame(message: &LiveMessage) -> Result<String, FrameError> {
    let mut line = serde_json::to_string(message).map_err(|e| FrameError::Malformed(e.to_string()))?;
    if line.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLong(line.len()));
    }
    line.push('\n');
    Ok(line)
}

pub fn decode_frame(line: &str) -> Result<LiveMessage, FrameError> {
    if line.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLong(line.len()));
    }
    serde_json::from_str(line.trim_end()).map_err(|e| FrameError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{location_sample::LocationSample, transport_mode::TransportMode};
    use serde_json::json;

    fn snapshot() -> Snapshot {
        Snapshot::new(20., 2, 10., TransportMode::Bike, 0., 0., vec![LocationSample::new(1., 2., 3)], Some(0), Some(2000))
    }

    #[test]
    fn stop_request_is_a_flat_snapshot_with_user_id() {
        let message = LiveMessage::Stop(StopRequest::new(snapshot(), Some("u1".into())));
        let json: serde_json::Value = serde_json::from_str(&encode_frame(&message).unwrap()).unwrap();

        assert_eq!(json["event"], "live:stop");
        assert_eq!(json["data"]["distanceMeters"], 20.);
        assert_eq!(json["data"]["mode"], "bike");
        assert_eq!(json["data"]["userId"], "u1");
        assert_eq!(json["data"]["points"][0]["lat"], 1.);
        assert!(json["data"].get("exchange").is_none());
    }

    #[test]
    fn exchange_id_travels_both_ways() {
        let request = StopRequest { exchange: Some(7), ..StopRequest::new(snapshot(), None) };
        let line = encode_frame(&LiveMessage::Stop(request.clone())).unwrap();
        assert_eq!(decode_frame(&line).unwrap(), LiveMessage::Stop(request));

        let ack = serde_json::to_value(StopAck::stored("a".into()).answering(Some(7))).unwrap();
        assert_eq!(ack, json!({ "ok": true, "id": "a", "exchange": 7 }));
    }

    #[test]
    fn decodes_relay_acknowledgements() {
        let ok = decode_frame(r#"{"event":"live:stop:ack","data":{"ok":true,"id":"1700000000000"}}"#).unwrap();
        assert_eq!(ok, LiveMessage::StopAck(StopAck::stored("1700000000000".into())));

        let failed = decode_frame("{\"event\":\"live:stop:ack\",\"data\":{\"ok\":false,\"error\":\"disk full\"}}\n").unwrap();
        assert_eq!(failed, LiveMessage::StopAck(StopAck::failed("disk full".into())));
    }

    #[test]
    fn degraded_flag_only_on_the_wire_when_set() {
        let stored = serde_json::to_value(StopAck::stored("a".into())).unwrap();
        assert_eq!(stored, json!({ "ok": true, "id": "a" }));

        let degraded = serde_json::to_value(StopAck::degraded("b".into())).unwrap();
        assert_eq!(degraded, json!({ "ok": true, "id": "b", "degraded": true }));
    }

    #[test]
    fn unit_event_without_data() {
        assert_eq!(decode_frame(r#"{"event":"stop-tracking"}"#).unwrap(), LiveMessage::StopTracking);
        let start = decode_frame(r#"{"event":"start-tracking","data":{}}"#).unwrap();
        assert_eq!(start, LiveMessage::StartTracking(TrackingOptions::default()));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode_frame("not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(decode_frame(r#"{"event":"live:nope","data":{}}"#), Err(FrameError::Malformed(_))));
    }
}
