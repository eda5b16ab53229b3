//! Storage abstractions for snapshot persistence.
//!
//! Two kinds of records are kept:
//! - a pointer naming the timestamp of the latest snapshot
//! - one body per snapshot holding every listing seen in that poll
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── last_run.json            # Pointer: {"last_modified": "..."}
//! ├── kitas_1760860800000.json # Body, named by unix millis
//! └── kitas_1760861180000.json
//! ```
//!
//! The body is always written before the pointer, and readers only trust a
//! pointer whose body exists.

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Snapshot;

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest persisted snapshot, or `None` when there is nothing usable.
    async fn load_previous(&self) -> Result<Option<Snapshot>>;

    /// Persist `snapshot` and make it the one `load_previous` returns.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}
