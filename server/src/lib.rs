pub mod config;
pub mod gps_feed;
pub mod http_api;
pub mod live_endpoint;
pub mod server_state;
