use std::time::Duration;

use green_tracker_lib::comms::{GpsData, LiveMessage, TrackingOptions};
use rand::Rng;
use tokio::{sync::mpsc, task::JoinHandle, time::{interval_at, Instant}};

/// Downtown Los Angeles.
pub const FEED_CENTER: (f64, f64) = (34.0522, -118.2437);
pub const FEED_JITTER_DEGREES: f64 = 0.005;
pub const DEFAULT_FEED_INTERVAL_MS: u64 = 2000;
const MIN_FEED_INTERVAL_MS: u64 = 50;

/// One fake reading near `FEED_CENTER`, moving at 10 to 15 m/s.
pub fn mock_reading(rng: &mut impl Rng) -> GpsData {
    GpsData {
        latitude: FEED_CENTER.0 + rng.random_range(-FEED_JITTER_DEGREES..=FEED_JITTER_DEGREES),
        longitude: FEED_CENTER.1 + rng.random_range(-FEED_JITTER_DEGREES..=FEED_JITTER_DEGREES),
        speed: rng.random_range(10.0..=15.0),
    }
}

/// Emits `gps-data` frames into `out` until aborted or the connection goes away.
pub fn spawn_mock_feed(options: &TrackingOptions, out: mpsc::UnboundedSender<LiveMessage>) -> JoinHandle<()> {
    let period = Duration::from_millis(options.interval_ms.unwrap_or(DEFAULT_FEED_INTERVAL_MS).max(MIN_FEED_INTERVAL_MS));

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let reading = mock_reading(&mut rand::rng());
            if out.send(LiveMessage::GpsData(reading)).is_err() {
                break;
            }
        }
        tracing::debug!("Mock GPS feed ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_near_the_center() {
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let reading = mock_reading(&mut rng);
            assert!((reading.latitude - FEED_CENTER.0).abs() <= FEED_JITTER_DEGREES + 1e-12);
            assert!((reading.longitude - FEED_CENTER.1).abs() <= FEED_JITTER_DEGREES + 1e-12);
            assert!((10.0..=15.0).contains(&reading.speed));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_on_the_default_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed = spawn_mock_feed(&TrackingOptions::default(), tx);

        tokio::time::sleep(Duration::from_millis(DEFAULT_FEED_INTERVAL_MS * 3 + 100)).await;
        feed.abort();

        let mut count = 0;
        while let Ok(message) = rx.try_recv() {
            assert!(matches!(message, LiveMessage::GpsData(_)));
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn stops_when_receiver_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = spawn_mock_feed(&TrackingOptions { interval_ms: Some(10) }, tx);
        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), feed).await.unwrap().unwrap();
    }
}
