//! Customer notifications.
//!
//! Sending is best-effort: the [`Dispatcher`] runs every email on its own task
//! after the triggering transaction has committed, and a failed send is only
//! logged. Nothing here feeds back into order state.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Event, Order, Ticket};

pub mod console;
pub mod smtp;
pub mod templates;

pub use console::ConsoleNotifier;
pub use smtp::SmtpNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// A ticket with the event details its e-ticket email shows.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
    pub ticket: Ticket,
    pub event: Event,
    pub ticket_type_name: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// One e-ticket email for one paid ticket.
    async fn ticket_issued(&self, order: &Order, ticket: &IssuedTicket) -> Result<(), NotifyError>;

    async fn payment_instructions(&self, order: &Order) -> Result<(), NotifyError>;

    async fn order_cancelled(&self, order: &Order, reason: &str) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn tickets_issued(&self, order: &Order, tickets: Vec<IssuedTicket>) {
        for ticket in tickets {
            let notifier = Arc::clone(&self.notifier);
            let order = order.clone();
            tokio::spawn(async move {
                match notifier.ticket_issued(&order, &ticket).await {
                    Ok(()) => debug!(
                        order_number = %order.order_number,
                        ticket_code = %ticket.ticket.ticket_code,
                        "E-ticket email sent"
                    ),
                    Err(e) => warn!(
                        order_number = %order.order_number,
                        ticket_code = %ticket.ticket.ticket_code,
                        error = %e,
                        "Failed to send e-ticket email"
                    ),
                }
            });
        }
    }

    pub fn payment_instructions(&self, order: &Order) {
        let notifier = Arc::clone(&self.notifier);
        let order = order.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.payment_instructions(&order).await {
                warn!(
                    order_number = %order.order_number,
                    error = %e,
                    "Failed to send payment instruction email"
                );
            }
        });
    }

    pub fn order_cancelled(&self, order: &Order, reason: &str) {
        let notifier = Arc::clone(&self.notifier);
        let order = order.clone();
        let reason = reason.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.order_cancelled(&order, &reason).await {
                warn!(
                    order_number = %order.order_number,
                    error = %e,
                    "Failed to send cancellation email"
                );
            }
        });
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Ticket {
            order_number: String,
            ticket_code: String,
        },
        PaymentInstructions {
            order_number: String,
        },
        Cancelled {
            order_number: String,
            reason: String,
        },
    }

    /// Records every notification; optionally reports each send as failed.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Sent>>,
        fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::default(),
                fail: true,
            }
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        /// Waits until at least `count` notifications were recorded, or gives
        /// up after about a second.
        pub async fn wait_for(&self, count: usize) -> Vec<Sent> {
            for _ in 0..200 {
                if self.sent.lock().unwrap().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.sent()
        }

        fn record(&self, sent: Sent) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(sent);
            if self.fail {
                Err(NotifyError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn ticket_issued(
            &self,
            order: &Order,
            ticket: &IssuedTicket,
        ) -> Result<(), NotifyError> {
            self.record(Sent::Ticket {
                order_number: order.order_number.clone(),
                ticket_code: ticket.ticket.ticket_code.clone(),
            })
        }

        async fn payment_instructions(&self, order: &Order) -> Result<(), NotifyError> {
            self.record(Sent::PaymentInstructions {
                order_number: order.order_number.clone(),
            })
        }

        async fn order_cancelled(&self, order: &Order, reason: &str) -> Result<(), NotifyError> {
            self.record(Sent::Cancelled {
                order_number: order.order_number.clone(),
                reason: reason.to_string(),
            })
        }
    }
}
