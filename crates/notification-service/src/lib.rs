mod smtp;
mod templates;

pub use smtp::SmtpNotifier;
pub use templates::EmailTemplate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Newly discovered symbols to report in one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerAlert {
    pub symbols: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl TickerAlert {
    pub fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn symbol_list(&self) -> String {
        self.symbols.join(", ")
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &TickerAlert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_tls: SmtpTls,
    pub smtp_timeout: Duration,
    pub sender_email: Option<String>,
    pub sender_password: Option<String>,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SmtpTls {
    /// Implicit TLS from the first byte (port 465).
    #[default]
    Tls,
    StartTls,
    None,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            smtp_tls: SmtpTls::Tls,
            smtp_timeout: Duration::from_secs(30),
            sender_email: None,
            sender_password: None,
            recipients: Vec::new(),
        }
    }
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let smtp_tls = match std::env::var("SMTP_TLS").unwrap_or_default().as_str() {
            "starttls" => SmtpTls::StartTls,
            "none" => SmtpTls::None,
            _ => SmtpTls::Tls,
        };

        Self {
            smtp_host: std::env::var("SMTP_HOST")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.smtp_host),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.smtp_port),
            smtp_tls,
            smtp_timeout: std::env::var("SMTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.smtp_timeout),
            sender_email: std::env::var("SENDER_EMAIL")
                .ok()
                .filter(|s| !s.is_empty()),
            sender_password: std::env::var("SENDER_PASSWORD")
                .or_else(|_| std::env::var("GMAIL_APP_PASSWORD"))
                .ok()
                .filter(|s| !s.is_empty()),
            recipients: parse_recipients(&std::env::var("RECIPIENT_EMAILS").unwrap_or_default()),
        }
    }

    /// Names of required settings that are absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.sender_email.is_none() {
            missing.push("SENDER_EMAIL");
        }
        if self.sender_password.is_none() {
            missing.push("SENDER_PASSWORD");
        }
        if self.recipients.is_empty() {
            missing.push("RECIPIENT_EMAILS");
        }
        missing
    }
}

/// Split a comma-separated address list, trimming and dropping blanks.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Dispatches ticker alerts to all configured channels.
pub struct NotificationService {
    channels: Arc<Vec<Box<dyn NotificationChannel>>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        let missing = config.missing_fields();
        if missing.is_empty() {
            match SmtpNotifier::new(config) {
                Ok(notifier) => {
                    tracing::info!(
                        "Email notifications enabled (SMTP {}:{} -> {} recipients)",
                        config.smtp_host,
                        config.smtp_port,
                        notifier.recipient_count()
                    );
                    channels.push(Box::new(notifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                }
            }
        } else {
            tracing::warn!(
                "Email configuration missing ({}); ticker alerts will be skipped",
                missing.join(", ")
            );
        }

        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Report `symbols` in one message. Returns the dispatch task, or `None`
    /// when there is nothing to send or no channel is configured.
    pub fn notify(&self, symbols: &[String]) -> Option<JoinHandle<()>> {
        if symbols.is_empty() {
            return None;
        }
        if !self.is_enabled() {
            tracing::warn!(
                "Email configuration missing. Skipping alert for {}",
                symbols.join(", ")
            );
            return None;
        }
        Some(self.send_alert(TickerAlert::new(symbols.to_vec())))
    }

    /// Send an alert to all configured channels (fire-and-forget via tokio::spawn).
    pub fn send_alert(&self, alert: TickerAlert) -> JoinHandle<()> {
        let channels = self.channels.clone();
        tokio::spawn(async move {
            for channel in channels.iter() {
                match channel.send(&alert).await {
                    Ok(()) => tracing::info!(
                        "Alert sent via {} for tickers: {}",
                        channel.name(),
                        alert.symbol_list()
                    ),
                    Err(e) => {
                        tracing::warn!("Failed to send notification via {}: {}", channel.name(), e)
                    }
                }
            }
        })
    }
}
