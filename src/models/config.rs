//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Upper bound for any configured pause, one week.
pub const MAX_DELAY_SECS: u64 = 7 * 24 * 60 * 60;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listing page location and HTTP behavior
    #[serde(default)]
    pub source: SourceConfig,

    /// Delay between polls
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// What makes a listing worth a notification
    #[serde(default)]
    pub filter: FilterConfig,

    /// Where snapshots are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Notification delivery
    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.source.listing_url())?;
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.fragment_selector.trim().is_empty() {
            return Err(AppError::validation("source.fragment_selector is empty"));
        }
        if self.schedule.base_delay_secs > MAX_DELAY_SECS
            || self.schedule.jitter_max_secs > MAX_DELAY_SECS
        {
            return Err(AppError::validation(format!(
                "schedule delays must not exceed {MAX_DELAY_SECS}s"
            )));
        }
        if self.schedule.jitter_min_secs > self.schedule.jitter_max_secs {
            return Err(AppError::validation(
                "schedule.jitter_min_secs must not exceed schedule.jitter_max_secs",
            ));
        }
        if self.filter.target_hours.trim().is_empty() {
            return Err(AppError::validation("filter.target_hours is empty"));
        }
        if self.notify.enabled {
            match self.notify.transport {
                MailTransport::Smtp => {
                    if self.notify.host.trim().is_empty() {
                        return Err(AppError::config(
                            "notify.host is required for SMTP delivery",
                        ));
                    }
                    if self.notify.port == 0 {
                        return Err(AppError::config("notify.port must be > 0"));
                    }
                    if self.notify.from_address().is_none() {
                        return Err(AppError::config(
                            "notify.sender or notify.user is required for SMTP delivery",
                        ));
                    }
                }
                MailTransport::Relay => match &self.notify.endpoint {
                    Some(endpoint) => {
                        url::Url::parse(endpoint)?;
                    }
                    None => {
                        return Err(AppError::config(
                            "notify.endpoint is required for relay delivery",
                        ));
                    }
                },
            }
            if self.notify.recipients.is_empty() {
                return Err(AppError::config(
                    "notify.recipients is empty while notifications are enabled",
                ));
            }
        }
        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(AppError::validation(format!(
                "logging.level '{}' is not a log level",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Listing page location and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory base URL; listing links are relative to it
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Free places page, relative to `base_url`
    #[serde(default = "defaults::listing_path")]
    pub listing_path: String,

    /// CSS query yielding the table cell children in document order
    #[serde(default = "defaults::fragment_selector")]
    pub fragment_selector: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    /// Full URL of the free places page.
    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url, self.listing_path)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            listing_path: defaults::listing_path(),
            fragment_selector: defaults::fragment_selector(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Poll scheduling. Each pause is `base_delay_secs` plus a random jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "defaults::base_delay")]
    pub base_delay_secs: u64,

    #[serde(default = "defaults::jitter_min")]
    pub jitter_min_secs: u64,

    #[serde(default = "defaults::jitter_max")]
    pub jitter_max_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: defaults::base_delay(),
            jitter_min_secs: defaults::jitter_min(),
            jitter_max_secs: defaults::jitter_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Daily hours a listing must offer to be of interest
    #[serde(default = "defaults::target_hours")]
    pub target_hours: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            target_hours: defaults::target_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `last_run.json` and the snapshot bodies
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,

    /// Snapshot bodies to retain; 0 keeps every one
    #[serde(default = "defaults::keep_snapshots")]
    pub keep_snapshots: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
            keep_snapshots: defaults::keep_snapshots(),
        }
    }
}

/// How notification mail leaves the machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// SMTP submission with STARTTLS
    #[default]
    Smtp,
    /// JSON POST to an HTTP mail relay
    Relay,
}

/// Mail settings for notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Notifications are only logged when off
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub transport: MailTransport,

    /// SMTP server
    #[serde(default = "defaults::smtp_host")]
    pub host: String,

    /// SMTP submission port
    #[serde(default = "defaults::smtp_port")]
    pub port: u16,

    /// HTTP endpoint of the mail relay
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// From address; the login user is used when unset
    #[serde(default)]
    pub sender: Option<String>,

    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default = "defaults::subject")]
    pub subject: String,
}

impl NotifyConfig {
    pub fn from_address(&self) -> Option<&str> {
        self.sender
            .as_deref()
            .or(self.user.as_deref())
            .filter(|address| !address.trim().is_empty())
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: MailTransport::default(),
            host: defaults::smtp_host(),
            port: defaults::smtp_port(),
            endpoint: None,
            user: None,
            password: None,
            sender: None,
            recipients: Vec::new(),
            subject: defaults::subject(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Source defaults
    pub fn base_url() -> String {
        "https://www.berlin.de/sen/jugend/familie-und-kinder/kindertagesbetreuung/kitas/verzeichnis/"
            .into()
    }
    pub fn listing_path() -> String {
        "FreiePlaetze.aspx".into()
    }
    pub fn fragment_selector() -> String {
        "form > div > table:nth-of-type(2) tr > td > *".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; kita-watch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Schedule defaults
    pub fn base_delay() -> u64 {
        300
    }
    pub fn jitter_min() -> u64 {
        60
    }
    pub fn jitter_max() -> u64 {
        300
    }

    pub fn target_hours() -> String {
        "7 - 9".into()
    }

    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn keep_snapshots() -> usize {
        10
    }

    pub fn smtp_host() -> String {
        "smtp.gmail.com".into()
    }
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn subject() -> String {
        "kita gefunden".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
