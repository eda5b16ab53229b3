//! Snapshot of all listings seen in one poll.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Kita;

/// All listings observed in one successful poll, keyed by `KitaNr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub entities: HashMap<String, Kita>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>, entities: HashMap<String, Kita>) -> Self {
        Self {
            timestamp,
            entities,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Same keys, and every listing equal to its counterpart.
    pub fn same_entities(&self, other: &Snapshot) -> bool {
        self.entities == other.entities
    }
}

/// Small record naming the latest snapshot body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotPointer {
    pub last_modified: DateTime<Utc>,
}
