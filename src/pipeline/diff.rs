//! Diff of one poll against the seen-set.
//!
//! Splits the fetched items into new items (to be reported) and sightings
//! of items already known. Nothing is written to the seen-set until the
//! plan is committed, and new entries are only committed once the digest
//! has been delivered.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{Item, SeenEntry, SeenSet};

/// Pending changes computed from one poll.
#[derive(Debug, Clone, Default)]
pub struct CyclePlan {
    /// Items not in the seen-set, in source order
    pub new_items: Vec<Item>,
    /// Entries for `new_items`, committed only after delivery
    pub new_entries: Vec<(String, SeenEntry)>,
    /// Refreshed entries for items already in the seen-set
    pub updates: Vec<(String, SeenEntry)>,
}

impl CyclePlan {
    /// Compare fetched items with the seen-set.
    ///
    /// Only the first occurrence of an id within one poll is used.
    pub fn build(seen: &SeenSet, items: &[Item], now: DateTime<Utc>) -> Self {
        let mut plan = Self::default();
        let mut visited: HashSet<&str> = HashSet::new();

        for item in items {
            if !visited.insert(item.id.as_str()) {
                log::debug!("Duplicate id {} in poll, ignoring repeat", item.id);
                continue;
            }
            match seen.get(&item.id) {
                Some(existing) => plan
                    .updates
                    .push((item.id.clone(), existing.sighted_again(item, now))),
                None => {
                    plan.new_entries
                        .push((item.id.clone(), SeenEntry::first_sighting(item, now)));
                    plan.new_items.push(item.clone());
                }
            }
        }
        plan
    }

    pub fn has_new(&self) -> bool {
        !self.new_items.is_empty()
    }

    /// Apply the plan. New entries are applied only if `delivered`.
    ///
    /// Returns the number of entries written.
    pub fn commit(self, seen: &mut SeenSet, delivered: bool) -> usize {
        let mut written = 0;
        for (id, entry) in self.updates {
            seen.commit(id, entry);
            written += 1;
        }
        if delivered {
            for (id, entry) in self.new_entries {
                seen.commit(id, entry);
                written += 1;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timestamp;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, hour, 0, 0).unwrap()
    }

    fn item(id: &str) -> Item {
        Item::new(id, id.to_uppercase(), format!("https://example.com/course/{id}/"), at(0))
    }

    #[test]
    fn test_new_and_known_items_are_split() {
        let mut seen = SeenSet::new();
        seen.commit("a", SeenEntry::first_sighting(&item("a"), at(1)));

        let plan = CyclePlan::build(&seen, &[item("a"), item("b")], at(2));

        assert_eq!(plan.new_items, vec![item("b")]);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].1.seen_count, 2);
        assert!(seen.get("a").unwrap().seen_count == 1, "build must not mutate");
    }

    #[test]
    fn test_undelivered_commit_keeps_only_updates() {
        let mut seen = SeenSet::new();
        seen.commit("a", SeenEntry::first_sighting(&item("a"), at(1)));

        let plan = CyclePlan::build(&seen, &[item("a"), item("b")], at(2));
        assert_eq!(plan.commit(&mut seen, false), 1);

        assert!(!seen.contains("b"));
        let a = seen.get("a").unwrap();
        assert_eq!(a.seen_count, 2);
        assert_eq!(a.first_seen, Timestamp::At(at(1)));
        assert_eq!(a.last_seen, Timestamp::At(at(2)));
    }

    #[test]
    fn test_delivered_commit_adds_new_entries() {
        let mut seen = SeenSet::new();
        let plan = CyclePlan::build(&seen, &[item("a"), item("b")], at(3));
        assert!(plan.has_new());
        assert_eq!(plan.commit(&mut seen, true), 2);

        assert_eq!(seen.len(), 2);
        assert_eq!(seen.get("b").unwrap().seen_count, 1);
    }

    #[test]
    fn test_duplicate_ids_use_first_occurrence() {
        let seen = SeenSet::new();
        let mut renamed = item("a");
        renamed.title = "Second title".into();

        let plan = CyclePlan::build(&seen, &[item("a"), renamed], at(4));

        assert_eq!(plan.new_items.len(), 1);
        assert_eq!(plan.new_entries[0].1.title, "A");
    }

    #[test]
    fn test_repoll_is_idempotent() {
        let mut seen = SeenSet::new();
        let items = [item("a"), item("b")];
        CyclePlan::build(&seen, &items, at(5)).commit(&mut seen, true);

        let later = at(5) + Duration::hours(24);
        let plan = CyclePlan::build(&seen, &items, later);
        assert!(!plan.has_new());
        plan.commit(&mut seen, false);

        for id in ["a", "b"] {
            let entry = seen.get(id).unwrap();
            assert_eq!(entry.seen_count, 2);
            assert_eq!(entry.first_seen, Timestamp::At(at(5)));
            assert_eq!(entry.last_seen, Timestamp::At(later));
        }
    }
}
