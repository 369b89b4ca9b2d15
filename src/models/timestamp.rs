//! Lenient timestamps for persisted records.
//!
//! Seen-set files written by older versions stored naive ISO-8601 strings,
//! and a hand-edited file may contain anything. A value that cannot be read
//! as a date is kept verbatim instead of failing the whole load, so the
//! pruning pass can treat it as "unknown age" and retain the entry.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A persisted point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    /// A successfully parsed instant.
    At(DateTime<Utc>),
    /// The raw text of a value that could not be parsed.
    Unparsed(String),
}

impl Timestamp {
    /// Parse RFC 3339 first, then naive `YYYY-MM-DDTHH:MM:SS[.f]` as UTC.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Self::At(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Self::At(naive.and_utc());
            }
        }
        Self::Unparsed(raw.to_string())
    }

    /// The parsed instant, if any.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(dt) => Some(*dt),
            Self::Unparsed(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::At(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Unparsed(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
