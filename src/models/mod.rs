// src/models/mod.rs

//! Domain models for the watcher.

mod config;
mod fragment;
pub mod kita;
mod snapshot;

// Re-export all public types
pub use config::{
    Config, FilterConfig, LoggingConfig, MAX_DELAY_SECS, MailTransport, NotifyConfig,
    ScheduleConfig, SourceConfig, StorageConfig,
};
pub use fragment::Fragment;
pub use kita::Kita;
pub use snapshot::{Snapshot, SnapshotPointer};
