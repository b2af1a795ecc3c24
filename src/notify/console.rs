//! Notifier that writes emails to the log instead of sending them.

use async_trait::async_trait;
use tracing::info;

use crate::models::Order;
use crate::notify::templates::{self, Email};
use crate::notify::{IssuedTicket, Notifier, NotifyError};

#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    frontend_url: String,
}

impl ConsoleNotifier {
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            frontend_url: frontend_url.into(),
        }
    }

    fn log(&self, kind: &str, email: &Email) {
        info!(
            to = %email.to,
            subject = %email.subject,
            kind,
            "Email (development mode, not sent)"
        );
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn ticket_issued(&self, order: &Order, ticket: &IssuedTicket) -> Result<(), NotifyError> {
        self.log("e-ticket", &templates::ticket_email(order, ticket));
        Ok(())
    }

    async fn payment_instructions(&self, order: &Order) -> Result<(), NotifyError> {
        self.log(
            "payment-instructions",
            &templates::payment_email(order, &self.frontend_url),
        );
        Ok(())
    }

    async fn order_cancelled(&self, order: &Order, reason: &str) -> Result<(), NotifyError> {
        self.log("cancellation", &templates::cancellation_email(order, reason));
        Ok(())
    }
}
