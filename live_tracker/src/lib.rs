pub mod clock;
pub mod config;
pub mod dashboard;
pub mod location;
pub mod save_channel;
pub mod tracker;

pub use tracker::*;
