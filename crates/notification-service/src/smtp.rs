use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::templates::EmailTemplate;
use crate::{NotificationChannel, NotificationConfig, NotificationError, SmtpTls, TickerAlert};

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let from_addr = config
            .sender_email
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SENDER_EMAIL not set".into()))?;
        let password = config
            .sender_password
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SENDER_PASSWORD not set".into()))?;

        let from: Mailbox = from_addr
            .parse()
            .map_err(|e| NotificationError::Config(format!("Invalid from address: {}", e)))?;

        let to: Vec<Mailbox> = config
            .recipients
            .iter()
            .filter_map(|addr| match addr.parse() {
                Ok(mailbox) => Some(mailbox),
                Err(e) => {
                    tracing::warn!("Skipping invalid recipient {}: {}", addr, e);
                    None
                }
            })
            .collect();

        if to.is_empty() {
            return Err(NotificationError::Config(
                "No valid RECIPIENT_EMAILS addresses".into(),
            ));
        }

        let builder = match config.smtp_tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host),
            SmtpTls::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            }
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                config.smtp_host.as_str(),
            )),
        }
        .map_err(|e| NotificationError::Smtp(format!("SMTP transport error: {}", e)))?;

        let transport = builder
            .port(config.smtp_port)
            .timeout(Some(config.smtp_timeout))
            .credentials(Credentials::new(from_addr.to_string(), password.to_string()))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len()
    }

    fn build_message(&self, alert: &TickerAlert) -> Result<Message, NotificationError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(EmailTemplate::subject(alert))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(EmailTemplate::render(alert))
            .map_err(|e| NotificationError::Smtp(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, alert: &TickerAlert) -> Result<(), NotificationError> {
        let email = self.build_message(alert)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::Smtp(format!("Failed to send email: {}", e)))?;

        tracing::debug!("Email delivered to {} recipient(s)", self.to.len());
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(recipients: &[&str]) -> NotificationConfig {
        NotificationConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            smtp_tls: SmtpTls::None,
            sender_email: Some("bot@example.com".into()),
            sender_password: Some("secret".into()),
            recipients: recipients.iter().map(|s| s.to_string()).collect(),
            ..NotificationConfig::default()
        }
    }

    #[test]
    fn test_invalid_recipients_are_skipped() {
        let notifier = SmtpNotifier::new(&config(&["ops@example.com", "not an address"])).unwrap();
        assert_eq!(notifier.recipient_count(), 1);
    }

    #[test]
    fn test_no_valid_recipients_is_config_error() {
        assert!(matches!(
            SmtpNotifier::new(&config(&["nope"])),
            Err(NotificationError::Config(_))
        ));
    }

    #[test]
    fn test_message_lists_every_recipient() {
        let notifier = SmtpNotifier::new(&config(&["a@example.com", "b@example.com"])).unwrap();
        let alert = TickerAlert::new(vec!["$AAPL".into(), "$TSLA".into()]);
        let raw = String::from_utf8(notifier.build_message(&alert).unwrap().formatted()).unwrap();

        assert!(raw.contains("Subject: New Stock Ticker Alert: $AAPL, $TSLA"));
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("From: bot@example.com"));
    }
}
