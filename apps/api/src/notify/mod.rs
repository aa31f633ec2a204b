//! Shortlist email delivery.

pub mod template;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

pub use template::{render_shortlist_email, SearchMetadata, ShortlistEmail};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait ShortlistNotifier: Send + Sync {
    async fn send(&self, recipient: &str, email: &ShortlistEmail) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl SmtpNotifier {
    /// STARTTLS relay. Credentials are only sent when both parts are set.
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(&settings.from)?,
        })
    }
}

#[async_trait]
impl ShortlistNotifier for SmtpNotifier {
    async fn send(&self, recipient: &str, email: &ShortlistEmail) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(recipient)?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())?;

        self.transport.send(message).await?;
        info!(recipient, subject = %email.subject, "Shortlist email sent");
        Ok(())
    }
}
