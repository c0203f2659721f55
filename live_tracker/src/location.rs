use std::{
    f64::consts::TAU,
    path::Path,
    str::FromStr,
    sync::{atomic::{AtomicUsize, Ordering}, Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use geo_types::Point;
use green_tracker_lib::{location_sample::LocationSample, TrackingError};
use rand::Rng;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Sample(LocationSample),
    Error(String),
}

/// An event tagged with the subscription generation it was produced under.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub generation: u64,
    pub event: LocationEvent,
}

pub type LocationSender = mpsc::UnboundedSender<LocationUpdate>;

/// Push based provider of location samples.
pub trait LocationSource: Send + Sync {
    /// Starts delivering updates tagged with `generation` until the subscription is closed.
    fn watch(&self, generation: u64, updates: LocationSender) -> Result<LocationSubscription, TrackingError>;
}

/// An open watch. Closing aborts the producer; dropping closes.
pub struct LocationSubscription {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl LocationSubscription {
    pub fn new(generation: u64, task: JoinHandle<()>) -> Self {
        Self { generation, task: Some(task) }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::trace!("Closed location subscription {}", self.generation);
        }
    }
}

impl Drop for LocationSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fails every watch, like a device without location permission.
pub struct NoLocationSource;

impl LocationSource for NoLocationSource {
    fn watch(&self, _generation: u64, _updates: LocationSender) -> Result<LocationSubscription, TrackingError> {
        Err(TrackingError::LocationUnavailable("no location provider on this device".into()))
    }
}

#[derive(Debug, Clone, Copy)]
struct ReplayPoint {
    position: Point,
    recorded_ms: i64,
}

/// Replays a recorded GPX track at its own pacing, sped up by a factor.
/// The cursor is shared between watches, so a resumed trip continues where it paused.
/// Samples are stamped with the replay clock, not the recorded times.
pub struct GpxReplaySource {
    points: Arc<Vec<ReplayPoint>>,
    cursor: Arc<AtomicUsize>,
    speedup: f64,
    clock: Arc<dyn Clock>,
}

impl GpxReplaySource {
    pub fn from_file(path: impl AsRef<Path>, speedup: f64) -> Result<Self, TrackingError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| TrackingError::LocationUnavailable(format!("Failed to open {:?}: {e}", path)))?;
        Self::from_reader(std::io::BufReader::new(file), speedup)
    }

    pub fn from_reader(reader: impl std::io::Read, speedup: f64) -> Result<Self, TrackingError> {
        let gpx = gpx::read(reader)
            .map_err(|e| TrackingError::LocationUnavailable(format!("Failed to read GPX: {e}")))?;

        let mut points = Vec::new();
        for track in gpx.tracks {
            for segment in track.segments {
                for point in segment.points {
                    let recorded = point.time
                        .and_then(|time| time.format().ok())
                        .and_then(|time| DateTime::<Utc>::from_str(&time).ok());

                    // Untimed points are spaced a second apart.
                    let recorded_ms = match recorded {
                        Some(time) => time.timestamp_millis(),
                        None => points.last().map_or(0, |last: &ReplayPoint| last.recorded_ms + 1000),
                    };

                    points.push(ReplayPoint { position: point.point(), recorded_ms });
                }
            }
        }

        if points.is_empty() {
            return Err(TrackingError::LocationUnavailable("GPX file has no track points".into()));
        }

        tracing::debug!("Loaded {} track points for replay", points.len());

        Ok(Self {
            points: Arc::new(points),
            cursor: Arc::new(AtomicUsize::new(0)),
            speedup: if speedup > 0. { speedup } else { 1. },
            clock: Arc::new(SystemClock),
        })
    }

    /// Use the tracker's clock so sample times and session time agree.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl LocationSource for GpxReplaySource {
    fn watch(&self, generation: u64, updates: LocationSender) -> Result<LocationSubscription, TrackingError> {
        let points = self.points.clone();
        let cursor = self.cursor.clone();
        let speedup = self.speedup;
        let clock = self.clock.clone();

        let task = tokio::spawn(async move {
            let mut previous_ms: Option<i64> = None;
            loop {
                let index = cursor.load(Ordering::SeqCst);
                let Some(point) = points.get(index).copied() else {
                    tracing::info!("Replay finished after {} points", points.len());
                    break;
                };

                if let Some(previous_ms) = previous_ms {
                    let gap_ms = (point.recorded_ms - previous_ms).max(0) as f64 / speedup;
                    tokio::time::sleep(Duration::from_millis(gap_ms as u64)).await;
                }

                let sample = LocationSample::from_point(point.position, clock.now());
                if updates.send(LocationUpdate { generation, event: LocationEvent::Sample(sample) }).is_err() {
                    break;
                }
                cursor.store(index + 1, Ordering::SeqCst);
                previous_ms = Some(point.recorded_ms);
            }
        });

        Ok(LocationSubscription::new(generation, task))
    }
}

/// A random walk at walking-to-cycling pace.
pub struct SimulatedSource {
    position: Arc<Mutex<Point>>,
    interval: Duration,
    step_meters: f64,
    clock: Arc<dyn Clock>,
}

impl SimulatedSource {
    pub fn new(start: Point, interval: Duration, step_meters: f64) -> Self {
        Self {
            position: Arc::new(Mutex::new(start)),
            interval,
            step_meters,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl LocationSource for SimulatedSource {
    fn watch(&self, generation: u64, updates: LocationSender) -> Result<LocationSubscription, TrackingError> {
        let position = self.position.clone();
        let interval = self.interval;
        let step_meters = self.step_meters;
        let clock = self.clock.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let point = {
                    let mut current = position.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    *current = random_step(*current, step_meters, &mut rand::rng());
                    *current
                };

                let sample = LocationSample::from_point(point, clock.now());
                if updates.send(LocationUpdate { generation, event: LocationEvent::Sample(sample) }).is_err() {
                    break;
                }
            }
        });

        Ok(LocationSubscription::new(generation, task))
    }
}

const METERS_PER_DEGREE: f64 = 111_320.;

fn random_step(from: Point, step_meters: f64, rng: &mut impl Rng) -> Point {
    let heading = rng.random_range(0.0..TAU);
    let meters = step_meters * rng.random_range(0.5..=1.5);

    let d_lat = meters * heading.cos() / METERS_PER_DEGREE;
    let d_lon = meters * heading.sin() / (METERS_PER_DEGREE * from.y().to_radians().cos().max(0.01));

    Point::new(from.x() + d_lon, from.y() + d_lat)
}
