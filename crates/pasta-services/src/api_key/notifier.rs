//! Delivery of verification links.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use pasta_core::{AppError, Config};
use std::sync::Arc;

#[async_trait]
pub trait VerificationNotifier: Send + Sync {
    async fn send_verification(
        &self,
        email: &str,
        name: &str,
        verify_url: &str,
    ) -> Result<(), AppError>;
}

/// SMTP notifier.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Returns `Ok(None)` when SMTP is not configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
        let (Some(host), Some(from)) = (config.smtp_host(), config.smtp_from()) else {
            tracing::debug!("SMTP not configured, API key requests are disabled");
            return Ok(None);
        };
        let from: Mailbox = from
            .parse()
            .map_err(|e| AppError::InvalidInput(format!("Invalid SMTP_FROM: {}", e)))?;
        let port = config.smtp_port();

        let builder = if config.smtp_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| AppError::Internal(format!("Invalid SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let builder = builder.port(port);
        let builder = match (config.smtp_user(), config.smtp_password()) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.to_string(), password.to_string()))
            }
            _ => builder,
        };

        tracing::info!(host = %host, port, tls = config.smtp_tls(), "Email notifier initialized");
        Ok(Some(Self {
            mailer: Arc::new(builder.build()),
            from,
        }))
    }
}

#[async_trait]
impl VerificationNotifier for EmailNotifier {
    async fn send_verification(
        &self,
        email: &str,
        name: &str,
        verify_url: &str,
    ) -> Result<(), AppError> {
        let to: Mailbox = email
            .parse()
            .map_err(|e| AppError::InvalidInput(format!("Invalid recipient address: {}", e)))?;

        let body = format!(
            "Hello {},\n\nConfirm your email address to activate your API key:\n\n{}\n\n\
             The link is valid for 24 hours. If you did not request a key, ignore this message.\n",
            name, verify_url
        );
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Verify your API key")
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("Failed to send email: {}", e)))?;
        tracing::info!("Verification email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasta_core::ServiceConfig;

    #[test]
    fn test_from_config_without_smtp_is_none() {
        let config = Config::new(ServiceConfig::default());
        assert!(EmailNotifier::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_config_rejects_bad_sender() {
        let config = Config::new(ServiceConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_from: Some("not an address".to_string()),
            ..ServiceConfig::default()
        });
        assert!(EmailNotifier::from_config(&config).is_err());
    }
}
