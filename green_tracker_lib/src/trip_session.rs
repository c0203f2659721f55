use serde::{Deserialize, Serialize};

use crate::{
    emissions::{EmissionCoefficientTable, Projection},
    location_sample::LocationSample,
    snapshot::Snapshot,
    transport_mode::TransportMode,
};

/// Consecutive samples closer than this are GPS noise and add no distance.
pub const MIN_SEGMENT_METERS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TripState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl Default for TripState {
    fn default() -> Self {
        TripState::Idle
    }
}

impl TripState {
    pub fn is_active(&self) -> bool {
        matches!(self, TripState::Running | TripState::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// The session is not running, the sample was not recorded.
    Dropped,
    /// Recorded; `counted_meters` is the distance added (0 for the first sample or noise).
    Recorded { counted_meters: f64 },
}

/// Accumulators and lifecycle of one tracked trip. Time is passed in by the caller
/// as epoch milliseconds, so the session itself never reads a clock.
#[derive(Debug, Clone)]
pub struct TripSession {
    state: TripState,
    mode: TransportMode,
    samples: Vec<LocationSample>,
    distance_meters: f64,
    started_at_ms: Option<i64>,
    paused_accum_ms: i64,
    paused_at_ms: Option<i64>,
    last_tick_ms: Option<i64>,
}

impl TripSession {
    pub fn new(mode: TransportMode) -> Self {
        Self {
            state: TripState::Idle,
            mode,
            samples: Vec::new(),
            distance_meters: 0.,
            started_at_ms: None,
            paused_accum_ms: 0,
            paused_at_ms: None,
            last_tick_ms: None,
        }
    }

    pub fn state(&self) -> TripState {
        self.state
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Changing the mode re-projects the whole trip, not just future distance.
    pub fn set_mode(&mut self, mode: TransportMode) {
        self.mode = mode;
    }

    pub fn samples(&self) -> &[LocationSample] {
        &self.samples
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    pub fn paused_accum_ms(&self) -> i64 {
        self.paused_accum_ms
    }

    /// Valid only from `Idle`. Returns whether the session started.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.state != TripState::Idle {
            return false;
        }
        self.clear_accumulators();
        self.started_at_ms = Some(now_ms);
        self.last_tick_ms = Some(now_ms);
        self.state = TripState::Running;
        true
    }

    pub fn on_sample(&mut self, sample: LocationSample) -> SampleOutcome {
        if self.state != TripState::Running {
            return SampleOutcome::Dropped;
        }

        let mut counted_meters = 0.;
        if let Some(previous) = self.samples.last() {
            let delta = previous.distance_to(&sample);
            if delta >= MIN_SEGMENT_METERS {
                self.distance_meters += delta;
                counted_meters = delta;
            }
        }
        self.samples.push(sample);
        self.tick(sample.captured_at_ms);

        SampleOutcome::Recorded { counted_meters }
    }

    /// Advances the last tick while running. Ticks never move backwards.
    pub fn tick(&mut self, now_ms: i64) {
        if self.state != TripState::Running {
            return;
        }
        self.last_tick_ms = Some(self.last_tick_ms.map_or(now_ms, |last| last.max(now_ms)));
    }

    /// Valid only from `Running`; otherwise a no-op returning false.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if self.state != TripState::Running {
            return false;
        }
        self.tick(now_ms);
        self.paused_at_ms = self.last_tick_ms;
        self.state = TripState::Paused;
        true
    }

    /// Valid only from `Paused`. Samples, distance and paused time are kept.
    pub fn resume(&mut self, now_ms: i64) -> bool {
        if self.state != TripState::Paused {
            return false;
        }
        if let Some(paused_at) = self.paused_at_ms.take() {
            self.paused_accum_ms += (now_ms - paused_at).max(0);
        }
        self.state = TripState::Running;
        self.tick(now_ms);
        true
    }

    /// Valid from `Running` or `Paused`. Materializes the final snapshot, then clears
    /// the accumulators and moves to `Stopped`. Returns `None` from any other state.
    pub fn stop(&mut self, now_ms: i64, table: &EmissionCoefficientTable) -> Option<Snapshot> {
        let duration_sec = match self.state {
            TripState::Running => {
                self.tick(now_ms);
                self.duration_sec()
            }
            TripState::Paused => {
                if let Some(paused_at) = self.paused_at_ms.take() {
                    self.paused_accum_ms += (now_ms - paused_at).max(0);
                }
                self.last_tick_ms = Some(now_ms);
                self.net_seconds(now_ms)
            }
            TripState::Idle | TripState::Stopped => return None,
        };

        let snapshot = self.build_snapshot(duration_sec, table, Some(now_ms));
        self.clear_accumulators();
        self.state = TripState::Stopped;
        Some(snapshot)
    }

    /// A mid-trip snapshot of the running accumulators. Leaves the session untouched.
    pub fn checkpoint(&self, now_ms: i64, table: &EmissionCoefficientTable) -> Option<Snapshot> {
        if self.state != TripState::Running {
            return None;
        }
        Some(self.build_snapshot(self.duration_sec_at(now_ms), table, None))
    }

    /// Net running seconds up to the last tick (or the pause instant while paused).
    pub fn duration_sec(&self) -> u64 {
        let reference = match self.state {
            TripState::Paused => self.paused_at_ms,
            _ => self.last_tick_ms,
        };
        reference.map_or(0, |reference| self.net_seconds(reference))
    }

    /// Like `duration_sec`, but measured to `now_ms` while running.
    pub fn duration_sec_at(&self, now_ms: i64) -> u64 {
        match self.state {
            TripState::Running => {
                let reference = self.last_tick_ms.map_or(now_ms, |last| last.max(now_ms));
                self.net_seconds(reference)
            }
            _ => self.duration_sec(),
        }
    }

    pub fn avg_speed_mps(&self) -> f64 {
        average_speed(self.distance_meters, self.duration_sec())
    }

    pub fn projection(&self, table: &EmissionCoefficientTable) -> Projection {
        table.project(self.distance_meters, self.mode)
    }

    fn net_seconds(&self, reference_ms: i64) -> u64 {
        let Some(started_at) = self.started_at_ms else {
            return 0;
        };
        let net_ms = (reference_ms - started_at - self.paused_accum_ms).max(0);
        (net_ms / 1000) as u64
    }

    fn build_snapshot(&self, duration_sec: u64, table: &EmissionCoefficientTable, stopped_at_ms: Option<i64>) -> Snapshot {
        let projection = self.projection(table);
        Snapshot::new(
            self.distance_meters,
            duration_sec,
            average_speed(self.distance_meters, duration_sec),
            self.mode,
            projection.kg_co2,
            projection.cost,
            self.samples.clone(),
            self.started_at_ms,
            stopped_at_ms,
        )
    }

    fn clear_accumulators(&mut self) {
        self.samples.clear();
        self.distance_meters = 0.;
        self.started_at_ms = None;
        self.paused_accum_ms = 0;
        self.paused_at_ms = None;
        self.last_tick_ms = None;
    }
}

fn average_speed(distance_meters: f64, duration_sec: u64) -> f64 {
    if duration_sec > 0 {
        distance_meters / duration_sec as f64
    } else {
        0.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesic::haversine_distance;

    // ~10 m of latitude
    const TEN_METERS_LAT: f64 = 10. / 111_194.93;

    fn table() -> EmissionCoefficientTable {
        EmissionCoefficientTable::default()
    }

    fn sample(step: f64, ts: i64) -> LocationSample {
        LocationSample::new(55. + step * TEN_METERS_LAT, 9., ts)
    }

    #[test]
    fn starts_only_from_idle() {
        let mut session = TripSession::new(TransportMode::Car);
        assert_eq!(session.distance_meters(), 0.);
        assert!(session.start(0));
        assert!(!session.start(10));
        assert_eq!(session.started_at_ms(), Some(0));
    }

    #[test]
    fn distance_is_the_sum_of_meaningful_segments() {
        let mut session = TripSession::new(TransportMode::Car);
        session.start(0);

        let samples = [
            sample(0., 0),
            sample(1., 1000),
            sample(1.02, 2000), // ~0.2 m, noise
            sample(2., 3000),
        ];

        let mut expected = 0.;
        for pair in samples.windows(2) {
            let d = haversine_distance(pair[0].latitude, pair[0].longitude, pair[1].latitude, pair[1].longitude);
            if d >= MIN_SEGMENT_METERS {
                expected += d;
            }
        }

        let outcomes: Vec<_> = samples.iter().map(|s| session.on_sample(*s)).collect();

        assert_eq!(outcomes[0], SampleOutcome::Recorded { counted_meters: 0. });
        assert_eq!(outcomes[2], SampleOutcome::Recorded { counted_meters: 0. });
        assert_eq!(session.samples().len(), 4);
        assert!((session.distance_meters() - expected).abs() < 1e-9);
    }

    #[test]
    fn three_samples_ten_meters_apart() {
        let mut session = TripSession::new(TransportMode::Car);
        session.start(0);
        for i in 0..3 {
            session.on_sample(sample(i as f64, i * 1000));
        }

        let snapshot = session.stop(2000, &table()).unwrap();
        assert!((snapshot.distance_meters - 20.).abs() < 0.01, "got {}", snapshot.distance_meters);
        assert_eq!(snapshot.duration_sec, 2);
        assert!((snapshot.avg_speed_mps - 10.).abs() < 0.01);
        assert_eq!(snapshot.started_at_ms, Some(0));
        assert_eq!(snapshot.stopped_at_ms, Some(2000));
        assert_eq!(snapshot.samples.len(), 3);
    }

    #[test]
    fn paused_intervals_are_excluded_from_duration() {
        let mut session = TripSession::new(TransportMode::Walk);
        session.start(0);

        session.tick(10_000);
        assert!(session.pause(10_000));
        assert_eq!(session.duration_sec(), 10);
        assert!(session.resume(25_000)); // 15 s paused

        session.tick(40_000);
        assert!(session.pause(40_000));
        assert!(session.resume(45_500)); // 5.5 s paused

        let snapshot = session.stop(60_000, &table()).unwrap();
        // 60 s wall clock, 20.5 s paused
        assert_eq!(snapshot.duration_sec, 39);
    }

    #[test]
    fn duration_is_frozen_while_paused() {
        let mut session = TripSession::new(TransportMode::Bike);
        session.start(0);
        session.pause(5_000);
        assert_eq!(session.duration_sec_at(50_000), 5);

        let snapshot = session.stop(50_000, &table()).unwrap();
        assert_eq!(snapshot.duration_sec, 5);
    }

    #[test]
    fn invalid_transitions_are_no_ops() {
        let mut session = TripSession::new(TransportMode::Car);
        assert!(!session.pause(100));
        assert!(!session.resume(100));
        assert!(session.stop(100, &table()).is_none());
        assert_eq!(session.state(), TripState::Idle);
        assert_eq!(session.on_sample(sample(0., 0)), SampleOutcome::Dropped);
        assert!(session.samples().is_empty());

        session.start(0);
        session.on_sample(sample(0., 0));
        session.on_sample(sample(1., 1000));
        assert!(session.stop(1000, &table()).is_some());

        let before = session.clone();
        assert!(!session.pause(2000));
        assert!(session.stop(2000, &table()).is_none());
        assert_eq!(session.state(), TripState::Stopped);
        assert_eq!(session.distance_meters(), before.distance_meters());
        assert_eq!(session.samples().len(), before.samples().len());
    }

    #[test]
    fn stop_clears_accumulators() {
        let mut session = TripSession::new(TransportMode::Car);
        session.start(0);
        session.on_sample(sample(0., 0));
        session.on_sample(sample(5., 1000));
        session.stop(1000, &table());

        assert_eq!(session.state(), TripState::Stopped);
        assert_eq!(session.distance_meters(), 0.);
        assert!(session.samples().is_empty());
        assert_eq!(session.started_at_ms(), None);
        assert_eq!(session.duration_sec(), 0);
    }

    #[test]
    fn samples_while_paused_are_dropped() {
        let mut session = TripSession::new(TransportMode::Car);
        session.start(0);
        session.on_sample(sample(0., 0));
        session.pause(1000);
        assert_eq!(session.on_sample(sample(3., 1500)), SampleOutcome::Dropped);
        assert_eq!(session.samples().len(), 1);
    }

    #[test]
    fn mode_change_reprojects_the_whole_trip() {
        let mut session = TripSession::new(TransportMode::Car);
        session.start(0);
        session.on_sample(sample(0., 0));
        session.on_sample(sample(100., 10_000));
        let as_car = session.projection(&table());

        session.set_mode(TransportMode::Public);
        let as_public = session.projection(&table());

        assert_eq!(as_car.km, as_public.km);
        assert!((as_public.kg_co2 - as_car.km * 0.05).abs() < 1e-12);

        let snapshot = session.stop(10_000, &table()).unwrap();
        assert_eq!(snapshot.mode, TransportMode::Public);
    }

    #[test]
    fn checkpoint_leaves_session_running() {
        let mut session = TripSession::new(TransportMode::Motorcycle);
        session.start(0);
        session.on_sample(sample(0., 0));
        session.on_sample(sample(50., 3000));

        let checkpoint = session.checkpoint(4000, &table()).unwrap();
        assert_eq!(checkpoint.duration_sec, 4);
        assert_eq!(checkpoint.stopped_at_ms, None);
        assert_eq!(session.state(), TripState::Running);
        assert_eq!(session.samples().len(), 2);
        assert_eq!(session.duration_sec(), 3);

        session.pause(5000);
        assert!(session.checkpoint(6000, &table()).is_none());
    }
}
