//! Diff calculation between two polls.
//!
//! Compares the freshly built snapshot with the previous one, filters the
//! listings of interest and decides whether that filtered set moved. Only a
//! change in the filtered set is worth a notification; listings appearing
//! or vanishing elsewhere in the table are merely logged.

use std::collections::HashMap;

use crate::models::{Kita, Snapshot};

/// Outcome of comparing the current poll with the previous one.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    /// Previous snapshot exists and holds exactly the same listings
    pub unchanged: bool,
    /// Listings of interest in the current poll, sorted by key
    pub interesting: Vec<Kita>,
    /// The set of interesting listings differs from the previous poll's
    pub changed_of_interest: bool,
    /// Keys that are new or whose listing changed
    pub added: Vec<String>,
    /// Keys no longer present
    pub removed: Vec<String>,
    /// Interesting listings that were not interesting (or not equal) before
    pub newly_interesting: Vec<Kita>,
}

/// Calculator for comparing snapshots under the interest predicate.
#[derive(Debug, Clone)]
pub struct DiffCalculator {
    target_hours: String,
}

impl DiffCalculator {
    /// `target_hours` is the schedule a listing must offer, e.g. `"7 - 9"`.
    pub fn new(target_hours: impl Into<String>) -> Self {
        Self {
            target_hours: target_hours.into(),
        }
    }

    /// Free places under three and the wanted schedule on offer.
    pub fn is_interesting(&self, kita: &Kita) -> bool {
        kita.free_spots_under() > 0 && kita.has_daily_hours(&self.target_hours)
    }

    fn interesting_of<'a>(
        &self,
        entities: &'a HashMap<String, Kita>,
    ) -> HashMap<&'a str, &'a Kita> {
        entities
            .iter()
            .filter(|(_, kita)| self.is_interesting(kita))
            .map(|(key, kita)| (key.as_str(), kita))
            .collect()
    }

    /// Compare `current` against `previous` (absent on a first run).
    pub fn calculate(&self, current: &Snapshot, previous: Option<&Snapshot>) -> DiffReport {
        let empty = HashMap::new();
        let prev_entities = previous.map_or(&empty, |p| &p.entities);

        let unchanged = previous.is_some_and(|p| p.same_entities(current));

        let curr_interesting = self.interesting_of(&current.entities);
        let prev_interesting = self.interesting_of(prev_entities);
        let changed_of_interest = curr_interesting != prev_interesting;

        let mut added: Vec<String> = current
            .entities
            .iter()
            .filter(|(key, kita)| prev_entities.get(*key) != Some(*kita))
            .map(|(key, _)| key.clone())
            .collect();
        added.sort();

        let mut removed: Vec<String> = prev_entities
            .keys()
            .filter(|key| !current.entities.contains_key(*key))
            .cloned()
            .collect();
        removed.sort();

        let mut newly_interesting: Vec<Kita> = curr_interesting
            .iter()
            .filter(|(key, kita)| prev_interesting.get(*key) != Some(*kita))
            .map(|(_, kita)| (*kita).clone())
            .collect();
        newly_interesting.sort_by(|a, b| a.key().cmp(b.key()));

        let mut interesting: Vec<Kita> = curr_interesting.into_values().cloned().collect();
        interesting.sort_by(|a, b| a.key().cmp(b.key()));

        DiffReport {
            unchanged,
            interesting,
            changed_of_interest,
            added,
            removed,
            newly_interesting,
        }
    }
}
