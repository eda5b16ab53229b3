//! Service layer for the watcher.
//!
//! This module contains:
//! - Listing table extraction (`extract_fragments`)
//! - Listing reconstruction (`KitaBuilder`)
//! - Page fetching (`PageSource`)
//! - Notification delivery (`Notifier`)

mod builder;
mod fragments;
pub mod notifier;
mod source;

pub use builder::{KitaBuilder, build_kitas};
pub use fragments::extract_fragments;
pub use notifier::{LogNotifier, Notification, Notifier, SmtpNotifier, WebhookNotifier};
pub use source::{HttpSource, PageSource, StaticSource};
