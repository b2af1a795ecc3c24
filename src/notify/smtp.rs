//! SMTP delivery through lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::config::SmtpConfig;
use crate::models::Order;
use crate::notify::templates::{self, Email};
use crate::notify::{IssuedTicket, Notifier, NotifyError};

#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    frontend_url: String,
}

impl SmtpNotifier {
    /// Builds the relay transport. No connection is opened until the first
    /// send.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
            frontend_url: config.frontend_url.clone(),
        })
    }

    async fn deliver(&self, email: Email) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotifyError::InvalidAddress(format!("{}: {e}", self.from)))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| NotifyError::InvalidAddress(format!("{}: {e}", email.to)))?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        debug!(to = %email.to, subject = %email.subject, "Email delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn ticket_issued(&self, order: &Order, ticket: &IssuedTicket) -> Result<(), NotifyError> {
        self.deliver(templates::ticket_email(order, ticket)).await
    }

    async fn payment_instructions(&self, order: &Order) -> Result<(), NotifyError> {
        self.deliver(templates::payment_email(order, &self.frontend_url))
            .await
    }

    async fn order_cancelled(&self, order: &Order, reason: &str) -> Result<(), NotifyError> {
        self.deliver(templates::cancellation_email(order, reason))
            .await
    }
}
