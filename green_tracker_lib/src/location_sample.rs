use chrono::{DateTime, Utc};
use geo_types::Point;
use serde::{Deserialize, Serialize};

/// One GPS fix. Serialized as `{lat, lon, ts}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(rename = "ts")]
    pub captured_at_ms: i64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, captured_at_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at_ms,
        }
    }

    /// geo-types points are (x, y) = (longitude, latitude).
    pub fn from_point(position: Point, captured_at: DateTime<Utc>) -> Self {
        Self::new(position.y(), position.x(), captured_at.timestamp_millis())
    }

    pub fn distance_to(&self, other: &LocationSample) -> f64 {
        crate::geodesic::haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_conversion_keeps_axis_order() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let sample = LocationSample::from_point(Point::new(10.2, 56.1), ts);

        assert_eq!(sample.latitude, 56.1);
        assert_eq!(sample.longitude, 10.2);
        assert_eq!(sample.captured_at_ms, 1_700_000_000_123);
    }

    #[test]
    fn serializes_with_short_keys() {
        let json = serde_json::to_value(LocationSample::new(1.5, 2.5, 42)).unwrap();
        assert_eq!(json, serde_json::json!({ "lat": 1.5, "lon": 2.5, "ts": 42 }));
    }
}
