pub mod api;
pub mod collector;
pub mod config;
pub mod db;
pub mod derived;
pub mod error;
pub mod export;
pub mod meter;
pub mod models;
pub mod repositories;
pub mod services;
pub mod ws;

// Re-export commonly used items
pub use collector::{Collector, CollectorState, CollectorStatus};
pub use config::Config;
pub use error::{AppError, Result};
pub use models::{AggregatedPoint, DerivedPoint, Measurement};
pub use ws::{AppState, Broadcaster};
