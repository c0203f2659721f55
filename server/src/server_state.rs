use std::sync::atomic::{AtomicUsize, Ordering};

use green_tracker_data_management::DataManager;

pub struct ServerState {
    pub data_manager: DataManager,
    // Open live connections, reported by the health check.
    connections: AtomicUsize,
}

impl ServerState {
    pub fn new(data_manager: DataManager) -> Self {
        Self {
            data_manager,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub(crate) fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }
}
