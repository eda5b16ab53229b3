// src/services/notifier.rs

//! Notification delivery.
//!
//! Mail is submitted over SMTP with STARTTLS, or posted as JSON to an HTTP
//! mail relay. With notifications switched off the message is only logged.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Kita, MailTransport, NotifyConfig};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A message about newly found listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

impl Notification {
    /// One line per listing, rendered with [`Kita::describe`].
    pub fn for_kitas<'a>(
        subject: impl Into<String>,
        recipients: Vec<String>,
        kitas: impl IntoIterator<Item = &'a Kita>,
    ) -> Self {
        let body = kitas
            .into_iter()
            .map(|kita| format!("{}\n", kita.describe()))
            .collect();
        Self {
            subject: subject.into(),
            body,
            recipients,
        }
    }
}

/// Delivers notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Build the notifier described by the configuration.
pub fn from_config(config: &NotifyConfig, client: Client) -> Result<Box<dyn Notifier>> {
    if !config.enabled {
        return Ok(Box::new(LogNotifier));
    }
    match config.transport {
        MailTransport::Smtp => Ok(Box::new(SmtpNotifier::new(config)?)),
        MailTransport::Relay => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                AppError::config("relay delivery enabled without notify.endpoint")
            })?;
            Ok(Box::new(WebhookNotifier {
                client,
                endpoint,
                sender: config.sender.clone(),
                user: config.user.clone(),
                password: config.password.clone(),
            }))
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| AppError::notify(format!("invalid mail address '{address}': {e}")))
}

/// Submits notifications to an SMTP server, upgrading with STARTTLS and
/// logging in when a user is configured.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let from = config
            .from_address()
            .ok_or_else(|| AppError::config("SMTP delivery needs notify.sender or notify.user"))?;
        let from = parse_mailbox(from)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .timeout(Some(SMTP_TIMEOUT));
        if let Some(user) = &config.user {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            host: format!("{}:{}", config.host, config.port),
        })
    }

    /// Plain text mail addressed to every recipient.
    pub fn message(&self, notification: &Notification) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &notification.recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }
        builder
            .body(notification.body.clone())
            .map_err(|e| AppError::notify(format!("could not build mail: {e}")))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let message = self.message(notification)?;
        let response = self.transport.send(message).await?;
        log::debug!("SMTP server {} answered {}", self.host, response.code());

        log::info!(
            "Notification sent to {}",
            notification.recipients.join(", ")
        );
        Ok(())
    }
}

/// Stand-in used while notifications are switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        log::debug!(
            "Notifications are switched off; not sending '{}' to {} recipient(s)",
            notification.subject,
            notification.recipients.len()
        );
        Ok(())
    }
}

/// Posts notifications to a mail relay endpoint.
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
    sender: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let message = RelayMessage {
            from: self.sender.as_deref(),
            to: &notification.recipients,
            subject: &notification.subject,
            text: &notification.body,
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::notify(format!(
                "mail relay {} answered {}",
                self.endpoint, status
            )));
        }

        log::info!(
            "Notification sent to {}",
            notification.recipients.join(", ")
        );
        Ok(())
    }
}
