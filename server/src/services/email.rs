use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected message with HTTP {0}")]
    Rejected(u16),

    #[error("{0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound delivery channel for notification mail.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn deliver(&self, message: &MailMessage) -> Result<(), NotifyError>;
}

/// Posts each message as JSON to an HTTP mail relay.
pub struct RelayTransport {
    client: reqwest::Client,
    url: String,
}

impl RelayTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MailTransport for RelayTransport {
    async fn deliver(&self, message: &MailMessage) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailService {
    transport: Option<Arc<dyn MailTransport>>,
    from: String,
    frontend_url: String,
}

impl EmailService {
    pub fn new(
        transport: Option<Arc<dyn MailTransport>>,
        from: impl Into<String>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            from: from.into(),
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &MailConfig) -> Self {
        let transport = config
            .relay_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| Arc::new(RelayTransport::new(url)) as Arc<dyn MailTransport>);

        if transport.is_none() {
            log::warn!("No mail relay configured; notification mail will be dropped");
        }

        Self::new(transport, config.from.clone(), config.frontend_url.clone())
    }

    /// Sends one message. Without a transport this is a successful no-op.
    pub async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let Some(transport) = &self.transport else {
            log::debug!("Mail transport disabled, skipping '{}' to {}", subject, to);
            return Ok(());
        };

        let message = MailMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        transport.deliver(&message).await?;

        log::info!("Sent '{}' mail to {}", subject, to);
        Ok(())
    }

    pub async fn send_reset_password_email(&self, to: &str, token: &str) -> Result<(), NotifyError> {
        let link = format!("{}/reset-password?token={}", self.frontend_url, token);
        let body = format!(
            "Dear user,\nTo reset your password, click on this link: {link}\n\
             If you did not request any password resets, then ignore this email."
        );
        self.send_email(to, "Reset password", &body).await
    }

    pub async fn send_verification_email(&self, to: &str, token: &str) -> Result<(), NotifyError> {
        let link = format!("{}/verify-email?token={}", self.frontend_url, token);
        let body = format!(
            "Dear user,\nTo verify your email, click on this link: {link}\n\
             If you did not create an account, then ignore this email."
        );
        self.send_email(to, "Email Verification", &body).await
    }
}
