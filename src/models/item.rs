//! Listing items and the seen-set that remembers them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Timestamp;

/// A candidate listing returned by a source for one poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    /// Stable, non-empty identifier
    pub id: String,

    /// Listing title
    pub title: String,

    /// Full URL to the listing
    pub url: String,

    /// When the source produced this item
    pub discovered_at: DateTime<Utc>,

    /// Instructor or author, when the source exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,

    /// Rating text as shown on the listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,

    /// Enrolment count text as shown on the listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub students: Option<String>,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            discovered_at,
            instructor: None,
            rating: None,
            students: None,
        }
    }
}

/// Persisted metadata for an item that has been reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenEntry {
    pub title: String,
    pub url: String,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub seen_count: u64,
}

impl SeenEntry {
    /// Entry for an item observed for the first time.
    pub fn first_sighting(item: &Item, now: DateTime<Utc>) -> Self {
        Self {
            title: item.title.clone(),
            url: item.url.clone(),
            first_seen: now.into(),
            last_seen: now.into(),
            seen_count: 1,
        }
    }

    /// Entry for another sighting of an already known item.
    ///
    /// Title and URL follow the latest listing; `first_seen` never moves.
    pub fn sighted_again(&self, item: &Item, now: DateTime<Utc>) -> Self {
        Self {
            title: item.title.clone(),
            url: item.url.clone(),
            first_seen: self.first_seen.clone(),
            last_seen: now.into(),
            seen_count: self.seen_count.saturating_add(1),
        }
    }
}

/// Mapping from item id to its seen metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SeenSet {
    entries: BTreeMap<String, SeenEntry>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&SeenEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or replace the entry for `id`.
    pub fn commit(&mut self, id: impl Into<String>, entry: SeenEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SeenEntry)> {
        self.entries.iter()
    }

    /// Up to `limit` entries, most recently first seen first. Entries with
    /// an unreadable `first_seen` sort last.
    pub fn newest(&self, limit: usize) -> Vec<(&String, &SeenEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|(_, a), (_, b)| b.first_seen.instant().cmp(&a.first_seen.instant()));
        entries.truncate(limit);
        entries
    }

    /// Remove entries last seen before `cutoff`. Returns the removed ids.
    ///
    /// Entries whose `last_seen` could not be parsed are kept.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry.last_seen.instant(), Some(at) if at < cutoff))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.entries.remove(id);
        }
        stale
    }

    /// Remove entries not sighted within `days` of `now`.
    ///
    /// Returns `None`, and removes nothing, when the window does not fit
    /// the calendar.
    pub fn prune_retained(&mut self, now: DateTime<Utc>, days: u64) -> Option<Vec<String>> {
        retention_cutoff(now, days).map(|cutoff| self.prune_older_than(cutoff))
    }
}

/// `now` minus `days`, or `None` when that is not a representable instant.
pub fn retention_cutoff(now: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    let days = i64::try_from(days).ok()?;
    now.checked_sub_signed(chrono::Duration::try_days(days)?)
}

impl FromIterator<(String, SeenEntry)> for SeenSet {
    fn from_iter<I: IntoIterator<Item = (String, SeenEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
