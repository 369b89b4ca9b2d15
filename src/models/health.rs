//! Health status published for external inspection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse watcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Starting,
    Healthy,
    Degraded,
    Error,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Starting => "starting",
            Status::Healthy => "healthy",
            Status::Degraded => "degraded",
            Status::Error => "error",
            Status::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Snapshot written to the health file.
///
/// Derived from the monitor's counters; nothing reads it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: Status,
    pub last_check: Option<DateTime<Utc>>,
    #[serde(rename = "courses_found")]
    pub total_courses_found: u64,
    pub emails_sent: u64,
    pub errors: u64,
    pub start_time: DateTime<Utc>,
    pub pid: u32,
}

impl HealthStatus {
    pub fn starting(start_time: DateTime<Utc>) -> Self {
        Self {
            status: Status::Starting,
            last_check: None,
            total_courses_found: 0,
            emails_sent: 0,
            errors: 0,
            start_time,
            pid: std::process::id(),
        }
    }

    /// Move to `next` unless the watcher has already stopped.
    ///
    /// Returns whether the status changed.
    pub fn transition(&mut self, next: Status) -> bool {
        if self.status == Status::Stopped || self.status == next {
            return false;
        }
        self.status = next;
        true
    }

    /// One-line summary for periodic logging.
    pub fn summary_line(&self) -> String {
        format!(
            "Health Status: {} | Courses: {} | Emails: {} | Errors: {}",
            self.status, self.total_courses_found, self.emails_sent, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_is_terminal() {
        let mut health = HealthStatus::starting(Utc::now());
        assert!(health.transition(Status::Healthy));
        assert!(health.transition(Status::Stopped));
        assert!(!health.transition(Status::Healthy));
        assert_eq!(health.status, Status::Stopped);
    }

    #[test]
    fn test_serializes_with_external_field_names() {
        let mut health = HealthStatus::starting(Utc::now());
        health.total_courses_found = 12;

        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "starting");
        assert_eq!(value["courses_found"], 12);
        assert!(value["last_check"].is_null());
        assert!(value.get("pid").is_some());
    }
}
