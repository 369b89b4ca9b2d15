//! Storage for the watcher's persisted state.
//!
//! ## Files
//!
//! ```text
//! seen_courses.json          # Seen-set: every reported item and its sightings
//! seen_courses.json.backup   # Copy of a seen-set that failed to parse
//! logs/health_status.json    # Health snapshot for external inspection
//! ```

mod health;
mod local;
mod seen;

// Re-export for convenience
pub use health::HealthStore;
pub use local::JsonFile;
pub use seen::{SeenSetFile, SeenStore};
