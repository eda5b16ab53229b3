//! Pipeline entry points for polling.
//!
//! - `DiffCalculator`: compare two snapshots under the interest filter
//! - `Poller`: run a single fetch, build, diff, notify, persist cycle
//! - `run_forever`: drive cycles with randomized pauses

pub mod diff;
pub mod poll;
pub mod schedule;

pub use diff::{DiffCalculator, DiffReport};
pub use poll::{CycleOutcome, CycleSummary, Poller};
pub use schedule::{next_delay, run_forever};
