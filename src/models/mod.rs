// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains the data structures shared by the pipeline,
//! the storage layer and the collaborators.

mod config;
mod health;
mod item;
mod selectors;
mod timestamp;

// Re-export all public types
pub use config::{
    Config, HealthConfig, HttpConfig, LoggingConfig, NotifierConfig, NotifierKind, PathsConfig,
    SmtpSecurity, SourceConfig, SourceKind, WatcherConfig,
};
pub use health::{HealthStatus, Status};
pub use item::{Item, SeenEntry, SeenSet, retention_cutoff};
pub use selectors::ListingSelectors;
pub use timestamp::Timestamp;
