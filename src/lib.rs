pub mod app;
pub mod config;
pub mod date;
pub mod errors;
pub mod handlers;
pub mod host;
pub mod matching;
pub mod models;
pub mod monitor;
pub mod service;
pub mod state;
pub mod storage;
pub mod tracker;

pub use app::router;
pub use config::{Config, TickPolicy};
pub use host::{Host, HostBridge};
pub use monitor::{ChannelLink, PageMonitor, TrackerLink};
pub use service::{TrackerEvent, TrackerHandle};
pub use state::AppState;
pub use storage::{BudgetStore, JsonFileStore, MemoryStore};
pub use tracker::Tracker;
