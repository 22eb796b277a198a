//! Outbound mail for account activation and password reset.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::MailSettings;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Shared handle stored as app data.
#[derive(Clone)]
pub struct MailerHandle(pub Arc<dyn Mailer>);

impl MailerHandle {
    /// SMTP when a host is configured, otherwise mail is only logged.
    pub fn from_settings(settings: &MailSettings) -> AppResult<Self> {
        match settings.smtp_host {
            Some(_) => Ok(Self(Arc::new(SmtpMailer::new(settings)?))),
            None => {
                info!("MT_SMTP_HOST not set; outgoing mail will be logged only");
                Ok(Self(Arc::new(LogMailer)))
            }
        }
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> AppResult<Self> {
        let host = settings
            .smtp_host
            .as_deref()
            .ok_or_else(|| AppError::Mail("SMTP host is not configured".to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Mail(format!("Invalid SMTP relay: {}", e)))?
            .port(settings.smtp_port)
            .pool_config(PoolConfig::default().max_size(5));

        if let (Some(username), Some(password)) = (&settings.smtp_username, &settings.smtp_password)
        {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        let from = settings
            .from
            .parse()
            .map_err(|e| AppError::Mail(format!("Invalid sender address: {}", e)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::Mail(format!("Invalid recipient address: {}", e)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| AppError::Mail(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Mail(format!("Failed to send mail: {}", e)))?;
        Ok(())
    }
}

/// Writes mail to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        info!(to, subject, "Mail not sent (no SMTP host):\n{}", body);
        Ok(())
    }
}

pub const ACTIVATION_SUBJECT: &str = "Activate your MozTrap account";

/// Body of the account activation mail.
pub fn activation_body(username: &str, activation_key: &str, days: i64) -> String {
    format!(
        "Hello {},\n\n\
         Activate your MozTrap account with this key within {} days:\n\n\
         /users/activate/{}/\n",
        username, days, activation_key
    )
}

/// Body of the password reset mail.
pub fn password_reset_body(username: &str, user_id: &str, token: &str) -> String {
    format!(
        "Hello {},\n\n\
         Someone asked to reset the password for your MozTrap account.\n\
         If it was you, use this link:\n\n\
         /users/password/reset/{}/{}/\n\n\
         Otherwise you can ignore this mail.\n",
        username, user_id, token
    )
}
