use std::sync::{atomic::{AtomicU64, Ordering}, Arc};

use green_tracker_data_management::history_store::HistoryStore;
use green_tracker_lib::{
    comms::StopRequest,
    emissions::{detect_mode_from_speed, EmissionCoefficientTable},
    history::HistoryRecord,
    round_to,
    snapshot::Snapshot,
    transport_mode::TransportMode,
    trip_session::{SampleOutcome, TripSession, TripState},
    TrackingError,
};
use serde_json::json;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    clock::Clock,
    location::{LocationEvent, LocationSource, LocationSubscription, LocationUpdate},
    save_channel::{SaveChannel, SaveOutcome},
};

/// Transient, user-visible messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    LocationUnavailable(String),
    LocationError(String),
    Stopped { applied: bool },
    SavedToServer { id: Option<String>, degraded: bool },
    ServerSaveFailed(String),
    ServerTimeout,
    LiveApplied,
    LocalPersistFailed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved { id: Option<String> },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveStats {
    pub state: TripState,
    pub mode: TransportMode,
    pub distance_km: f64,
    pub duration_sec: u64,
    pub avg_speed_mps: f64,
    pub kg_co2: f64,
    pub cost: f64,
    pub points: usize,
    /// A hint from the average speed, never applied to the trip.
    pub detected_mode: TransportMode,
}

impl LiveStats {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "state": self.state,
            "mode": self.mode,
            "distanceKm": round_to(self.distance_km, 3),
            "durationSec": self.duration_sec,
            "avgSpeed": round_to(self.avg_speed_mps, 2),
            "kgCO2": round_to(self.kg_co2, 4),
            "cost": round_to(self.cost, 2),
            "points": self.points,
            "detectedMode": self.detected_mode,
        })
    }
}

/// What `stop` produced. `save` resolves once the relay exchange settles.
pub struct StopReport {
    pub snapshot: Snapshot,
    pub save: Option<JoinHandle<SaveOutcome>>,
}

pub type ApplyCallback = Box<dyn Fn(&Snapshot) + Send + Sync>;

/**
 * Drives one `TripSession` from a location source.
 *
 * The tracker is owned by a single event loop: location updates arrive on the receiver
 * returned by `new` and are fed back through `handle_location`, interleaved with user
 * commands. Every completed trip is written to the history before anything is sent.
 */
pub struct LiveTracker {
    session: TripSession,
    table: &'static EmissionCoefficientTable,
    source: Arc<dyn LocationSource>,
    subscription: Option<LocationSubscription>,
    generation: u64,
    updates: mpsc::UnboundedSender<LocationUpdate>,
    history: HistoryStore,
    channel: Option<Arc<dyn SaveChannel>>,
    clock: Arc<dyn Clock>,
    on_apply: Option<ApplyCallback>,
    notices: broadcast::Sender<Notice>,
    save_status: Arc<watch::Sender<SaveStatus>>,
    /// Bumped by every `start`. A save only reports back while its trip is still the latest.
    trip: Arc<AtomicU64>,
    user_id: Option<String>,
}

impl LiveTracker {
    pub fn new(
        mode: TransportMode,
        source: Arc<dyn LocationSource>,
        history: HistoryStore,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<LocationUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(64);
        let (save_status, _) = watch::channel(SaveStatus::Idle);

        let tracker = Self {
            session: TripSession::new(mode),
            table: EmissionCoefficientTable::global(),
            source,
            subscription: None,
            generation: 0,
            updates,
            history,
            channel: None,
            clock,
            on_apply: None,
            notices,
            save_status: Arc::new(save_status),
            trip: Arc::new(AtomicU64::new(0)),
            user_id: None,
        };

        (tracker, updates_rx)
    }

    pub fn with_channel(mut self, channel: Arc<dyn SaveChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Called with every applied snapshot: final ones at stop, checkpoints from `apply_now`.
    pub fn on_apply(mut self, callback: impl Fn(&Snapshot) + Send + Sync + 'static) -> Self {
        self.on_apply = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> TripState {
        self.session.state()
    }

    pub fn mode(&self) -> TransportMode {
        self.session.mode()
    }

    pub fn session(&self) -> &TripSession {
        &self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_watching(&self) -> bool {
        self.subscription.as_ref().is_some_and(|subscription| !subscription.is_closed())
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn save_status(&self) -> watch::Receiver<SaveStatus> {
        self.save_status.subscribe()
    }

    /// Starts a trip. A stopped session is replaced by a fresh one first.
    pub fn start(&mut self) -> Result<(), TrackingError> {
        match self.session.state() {
            TripState::Running | TripState::Paused => return Err(TrackingError::SessionActive),
            TripState::Stopped => self.session = TripSession::new(self.session.mode()),
            TripState::Idle => {}
        }

        self.open_subscription()?;
        self.session.start(self.clock.now_ms());
        self.trip.fetch_add(1, Ordering::SeqCst);
        self.save_status.send_replace(SaveStatus::Idle);
        tracing::info!("Trip started ({})", self.session.mode());
        Ok(())
    }

    /// Feeds one update from the location source. Updates from closed or older
    /// subscriptions are dropped.
    pub async fn handle_location(&mut self, update: LocationUpdate) -> SampleOutcome {
        let current = self.subscription.as_ref().map(|subscription| subscription.generation());
        if current != Some(update.generation) {
            tracing::trace!("Dropping update from generation {} (current {:?})", update.generation, current);
            return SampleOutcome::Dropped;
        }

        match update.event {
            LocationEvent::Sample(sample) => self.session.on_sample(sample),
            LocationEvent::Error(reason) => {
                tracing::warn!("Location stream failed: {reason}");
                self.notify(Notice::LocationError(reason));
                self.stop(false).await;
                SampleOutcome::Dropped
            }
        }
    }

    pub fn tick(&mut self) {
        self.session.tick(self.clock.now_ms());
    }

    pub fn pause(&mut self) -> bool {
        if !self.session.pause(self.clock.now_ms()) {
            return false;
        }
        self.close_subscription();
        tracing::info!("Trip paused");
        true
    }

    /// Reopens the location watch and keeps everything recorded so far.
    pub fn resume(&mut self) -> Result<bool, TrackingError> {
        if self.session.state() != TripState::Paused {
            return Ok(false);
        }
        self.open_subscription()?;
        self.session.resume(self.clock.now_ms());
        tracing::info!("Trip resumed");
        Ok(true)
    }

    /// Ends the trip. The snapshot always goes to the history; with `apply_final` it is
    /// also applied and offered to the relay. No-op unless running or paused.
    pub async fn stop(&mut self, apply_final: bool) -> Option<StopReport> {
        self.close_subscription();

        let now_ms = self.clock.now_ms();
        let snapshot = self.session.stop(now_ms, self.table)?;

        tracing::info!(
            "Trip stopped: {:.0} m in {} s by {}, {} kg CO2",
            snapshot.distance_meters, snapshot.duration_sec, snapshot.mode, snapshot.kg_co2
        );

        if let Err(e) = self.history.append(HistoryRecord::from_live(snapshot.clone(), self.clock.now())).await {
            tracing::error!("Failed to record trip locally: {e}");
            self.notify(Notice::LocalPersistFailed(e.to_string()));
        }

        self.notify(Notice::Stopped { applied: apply_final });

        if !apply_final {
            return Some(StopReport { snapshot, save: None });
        }

        self.apply(&snapshot);
        let save = self.channel.clone().map(|channel| self.spawn_save(channel, snapshot.clone()));

        Some(StopReport { snapshot, save })
    }

    /// Applies a checkpoint of the running trip without touching it.
    pub fn apply_now(&self) -> Option<Snapshot> {
        let snapshot = self.session.checkpoint(self.clock.now_ms(), self.table)?;
        self.apply(&snapshot);
        Some(snapshot)
    }

    /// Re-projects the whole trip in the new mode.
    pub fn set_mode(&mut self, mode: TransportMode) {
        self.session.set_mode(mode);
    }

    pub fn live_stats(&self) -> LiveStats {
        let projection = self.session.projection(self.table);
        let duration_sec = match self.session.state() {
            TripState::Running => self.session.duration_sec_at(self.clock.now_ms()),
            _ => self.session.duration_sec(),
        };
        let avg_speed_mps = if duration_sec > 0 {
            self.session.distance_meters() / duration_sec as f64
        } else {
            0.
        };

        LiveStats {
            state: self.session.state(),
            mode: self.session.mode(),
            distance_km: projection.km,
            duration_sec,
            avg_speed_mps,
            kg_co2: projection.kg_co2,
            cost: projection.cost,
            points: self.session.samples().len(),
            detected_mode: detect_mode_from_speed(avg_speed_mps),
        }
    }

    fn apply(&self, snapshot: &Snapshot) {
        if let Some(callback) = &self.on_apply {
            callback(snapshot);
        }
        self.notify(Notice::LiveApplied);
    }

    fn spawn_save(&self, channel: Arc<dyn SaveChannel>, snapshot: Snapshot) -> JoinHandle<SaveOutcome> {
        let request = StopRequest::new(snapshot, self.user_id.clone());
        let notices = self.notices.clone();
        let save_status = self.save_status.clone();
        let latest_trip = self.trip.clone();
        let trip = latest_trip.load(Ordering::SeqCst);

        save_status.send_replace(SaveStatus::Saving);

        tokio::spawn(async move {
            let outcome = channel.send(request).await;

            let (status, notice) = match &outcome {
                SaveOutcome::Ack { id, degraded } => (
                    SaveStatus::Saved { id: id.clone() },
                    Notice::SavedToServer { id: id.clone(), degraded: *degraded },
                ),
                SaveOutcome::Nack(reason) | SaveOutcome::ChannelError(reason) => (
                    SaveStatus::Failed { reason: reason.clone() },
                    Notice::ServerSaveFailed(reason.clone()),
                ),
                SaveOutcome::Timeout => (
                    SaveStatus::Failed { reason: "timed out, saved locally only".into() },
                    Notice::ServerTimeout,
                ),
            };

            if latest_trip.load(Ordering::SeqCst) != trip {
                tracing::info!("Save for an earlier trip finished: {:?}", outcome);
                return outcome;
            }

            tracing::info!("Save exchange finished: {:?}", outcome);
            save_status.send_replace(status);
            let _ = notices.send(notice);
            outcome
        })
    }

    fn open_subscription(&mut self) -> Result<(), TrackingError> {
        self.close_subscription();
        self.generation += 1;

        match self.source.watch(self.generation, self.updates.clone()) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{e}");
                if let TrackingError::LocationUnavailable(reason) = &e {
                    self.notify(Notice::LocationUnavailable(reason.clone()));
                }
                Err(e)
            }
        }
    }

    // The handle is gone before anything else happens, so later updates find no match.
    fn close_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }
}
