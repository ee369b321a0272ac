pub mod cache;
pub mod cluster;
pub mod config;
pub mod ingest;
pub mod schema;
pub mod session;
pub mod spotify;
pub mod store;
pub mod table;

/// Application name for XDG paths
pub const APP_NAME: &str = "tracklens";
