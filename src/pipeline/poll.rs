// src/pipeline/poll.rs

//! One poll cycle: fetch, build, diff, notify, persist.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Config, Snapshot};
use crate::pipeline::diff::{DiffCalculator, DiffReport};
use crate::services::{Notification, Notifier, PageSource, build_kitas, extract_fragments};
use crate::storage::SnapshotStore;

/// What a completed cycle did.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub timestamp: DateTime<Utc>,
    pub kita_count: usize,
    pub report: DiffReport,
    /// A notification was handed to the notifier and accepted
    pub notified: bool,
}

/// Result of a cycle that did not fail.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The table yielded no fragments; nothing was persisted.
    Empty,
    Completed(CycleSummary),
}

/// Runs poll cycles against a page source, a store and a notifier.
pub struct Poller {
    source: Box<dyn PageSource>,
    store: Box<dyn SnapshotStore>,
    notifier: Box<dyn Notifier>,
    calculator: DiffCalculator,
    base_url: String,
    fragment_selector: String,
    subject: String,
    recipients: Vec<String>,
}

impl Poller {
    pub fn new(
        config: &Config,
        source: Box<dyn PageSource>,
        store: Box<dyn SnapshotStore>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            calculator: DiffCalculator::new(&config.filter.target_hours),
            base_url: config.source.base_url.clone(),
            fragment_selector: config.source.fragment_selector.clone(),
            subject: config.notify.subject.clone(),
            recipients: config.notify.recipients.clone(),
        }
    }

    /// Previous snapshot from the store; unreadable state counts as a first run.
    pub async fn load_previous(&self) -> Option<Snapshot> {
        match self.store.load_previous().await {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("Could not load previous run, starting fresh: {}", e);
                None
            }
        }
    }

    /// Run one cycle stamped with the current time.
    pub async fn run_cycle(&self, previous: &mut Option<Snapshot>) -> Result<CycleOutcome> {
        self.run_cycle_at(previous, Utc::now()).await
    }

    /// Run one cycle whose snapshot is stamped `timestamp`.
    ///
    /// On success `previous` is replaced by the new snapshot. On error, or
    /// when the page yields nothing, `previous` and the store are untouched.
    pub async fn run_cycle_at(
        &self,
        previous: &mut Option<Snapshot>,
        timestamp: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let html = self.source.fetch().await?;

        let fragments = extract_fragments(&html, &self.fragment_selector)?;
        if fragments.is_empty() {
            log::warn!("Possible error - no kita elements found");
            return Ok(CycleOutcome::Empty);
        }

        let kitas = build_kitas(&fragments, &self.base_url)?;
        let current = Snapshot::new(timestamp, kitas);
        let report = self.calculator.calculate(&current, previous.as_ref());

        self.log_report(&current, previous.as_ref(), &report);

        let mut notified = false;
        if report.changed_of_interest && !report.interesting.is_empty() {
            notified = self.dispatch(&report).await;
        }

        self.store.save(&current).await?;

        let summary = CycleSummary {
            timestamp,
            kita_count: current.len(),
            report,
            notified,
        };
        *previous = Some(current);
        Ok(CycleOutcome::Completed(summary))
    }

    fn log_report(&self, current: &Snapshot, previous: Option<&Snapshot>, report: &DiffReport) {
        if report.unchanged {
            if let Some(previous) = previous {
                log::info!(
                    "No changes - page last detected update {}",
                    previous.timestamp
                );
            }
            return;
        }

        if report.added.is_empty() {
            log::info!(
                "Page update - but {} kita(s) have just been removed",
                report.removed.len()
            );
        } else if !report.changed_of_interest {
            log::info!("Page updated - but no kitas of interest");
        } else if report.interesting.is_empty() {
            log::info!("Page updated - kitas of interest are gone");
        }

        log::info!(
            "kitas(with_free): {}({})",
            current.len(),
            report.interesting.len()
        );
    }

    async fn dispatch(&self, report: &DiffReport) -> bool {
        for kita in &report.interesting {
            log::info!("{}", kita.describe());
        }

        let notification = Notification::for_kitas(
            self.subject.clone(),
            self.recipients.clone(),
            &report.interesting,
        );
        match self.notifier.notify(&notification).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to send notification: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::StaticSource;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const ONE_KITA_PAGE: &str = "<html><body><form><div>\
        <table><tr><td>Suche</td></tr></table>\
        <table>\
        <tr><td><a id=\"GridView1_HLinkKitaNr_0\" href=\"Einrichtung.aspx?ID=1001\">1001</a></td>\
        <td><span id=\"GridView1_lblKitaName_0\">Kita Sonnenschein</span></td>\
        <td><span id=\"GridView1_lblKitaAdresse_0\">Hauptstr. 1</span></td>\
        <td><span id=\"GridView1_lblOrtsteil_0\">Pankow</span></td>\
        <td><span id=\"GridView1_lblPlaetzeUnter3_0\">2</span></td>\
        <td><span id=\"GridView1_lblPlaetzeUeber3_0\">0</span></td>\
        <td><span id=\"GridView1_lblStdTaeglich_0\">7 - 9</span></td></tr>\
        </table></div></form></body></html>";

    const EMPTY_PAGE: &str = "<html><body><form><div><table></table><table></table>\
        </div></form></body></html>";

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<Notification>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                return Err(AppError::notify("relay down"));
            }
            Ok(())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl PageSource for FailingSource {
        async fn fetch(&self) -> Result<String> {
            Err(AppError::Status {
                url: "https://example.com/FreiePlaetze.aspx".into(),
                status: 503,
            })
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.source.base_url = "https://example.com/verzeichnis/".into();
        config.notify.recipients = vec!["parent@example.com".into()];
        config
    }

    fn poller(
        source: Box<dyn PageSource>,
        dir: &TempDir,
        notifier: &RecordingNotifier,
    ) -> Poller {
        Poller::new(
            &config(),
            source,
            Box::new(LocalStorage::new(dir.path())),
            Box::new(notifier.clone()),
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_first_then_identical_second_run() {
        let tmp = TempDir::new().unwrap();
        let notifier = RecordingNotifier::default();
        let poller = poller(Box::new(StaticSource::new(ONE_KITA_PAGE)), &tmp, &notifier);
        let storage = LocalStorage::new(tmp.path());

        let mut previous = poller.load_previous().await;
        assert!(previous.is_none());

        let first = match poller.run_cycle_at(&mut previous, at(0)).await.unwrap() {
            CycleOutcome::Completed(summary) => summary,
            CycleOutcome::Empty => panic!("expected a completed cycle"),
        };
        assert!(first.notified);
        assert!(first.report.changed_of_interest);
        assert_eq!(first.kita_count, 1);
        assert_eq!(first.report.interesting.len(), 1);

        {
            let sent = notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].subject, "kita gefunden");
            assert_eq!(sent[0].recipients, vec!["parent@example.com"]);
            let lines: Vec<&str> = sent[0].body.lines().collect();
            assert_eq!(lines, vec![first.report.interesting[0].describe()]);
            assert!(lines[0].contains("Link: https://example.com/verzeichnis/Einrichtung.aspx?ID=1001"));
        }

        let stored = storage.load_previous().await.unwrap().unwrap();
        assert_eq!(stored.timestamp, at(0));

        let second = match poller.run_cycle_at(&mut previous, at(400)).await.unwrap() {
            CycleOutcome::Completed(summary) => summary,
            CycleOutcome::Empty => panic!("expected a completed cycle"),
        };
        assert!(second.report.unchanged);
        assert!(!second.report.changed_of_interest);
        assert!(!second.notified);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);

        let stored = storage.load_previous().await.unwrap().unwrap();
        assert_eq!(stored.timestamp, at(400));
        assert_eq!(previous.as_ref().map(|p| p.timestamp), Some(at(400)));
    }

    #[tokio::test]
    async fn test_restart_resumes_from_store() {
        let tmp = TempDir::new().unwrap();
        let notifier = RecordingNotifier::default();

        let first = poller(Box::new(StaticSource::new(ONE_KITA_PAGE)), &tmp, &notifier);
        let mut previous = first.load_previous().await;
        first.run_cycle_at(&mut previous, at(0)).await.unwrap();

        let restarted = poller(Box::new(StaticSource::new(ONE_KITA_PAGE)), &tmp, &notifier);
        let mut previous = restarted.load_previous().await;
        assert!(previous.is_some());
        restarted.run_cycle_at(&mut previous, at(400)).await.unwrap();

        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_state_untouched() {
        let tmp = TempDir::new().unwrap();
        let notifier = RecordingNotifier::default();
        let poller = poller(Box::new(FailingSource), &tmp, &notifier);

        let mut previous = None;
        let result = poller.run_cycle_at(&mut previous, at(0)).await;

        assert!(matches!(result, Err(AppError::Status { status: 503, .. })));
        assert!(previous.is_none());
        assert!(LocalStorage::new(tmp.path()).load_pointer().await.unwrap().is_none());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_table_is_not_persisted() {
        let tmp = TempDir::new().unwrap();
        let notifier = RecordingNotifier::default();
        let poller = poller(Box::new(StaticSource::new(EMPTY_PAGE)), &tmp, &notifier);

        let mut previous = None;
        let outcome = poller.run_cycle_at(&mut previous, at(0)).await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Empty));
        assert!(previous.is_none());
        assert!(LocalStorage::new(tmp.path()).load_pointer().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_structural_error_aborts_without_persisting() {
        let page = ONE_KITA_PAGE.replace("lblOrtsteil_0", "lblOrtsteil_4");
        let tmp = TempDir::new().unwrap();
        let notifier = RecordingNotifier::default();
        let poller = poller(Box::new(StaticSource::new(page)), &tmp, &notifier);

        let mut previous = None;
        let result = poller.run_cycle_at(&mut previous, at(0)).await;

        assert!(matches!(result, Err(AppError::Scrape(_))));
        assert!(LocalStorage::new(tmp.path()).load_pointer().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notification_failure_still_persists() {
        let tmp = TempDir::new().unwrap();
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let poller = poller(Box::new(StaticSource::new(ONE_KITA_PAGE)), &tmp, &notifier);

        let mut previous = None;
        let outcome = poller.run_cycle_at(&mut previous, at(0)).await.unwrap();

        match outcome {
            CycleOutcome::Completed(summary) => assert!(!summary.notified),
            CycleOutcome::Empty => panic!("expected a completed cycle"),
        }
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert!(previous.is_some());
        assert!(LocalStorage::new(tmp.path()).load_previous().await.unwrap().is_some());
    }
}
