//! Settles manual bank transfers from the bank's notification emails.
//!
//! Heuristic by nature: the only link between a transfer and an order is
//! the fingerprinted total. A mail settles an order only when its amount
//! matches exactly one pending manual-transfer order for the configured
//! bank; anything else is left for a human.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::jobs::spawn_periodic;
use crate::models::Order;
use crate::orders::OrderService;
use crate::payment::is_manual_transfer;
use crate::utils::error::AppError;
use crate::utils::money::parse_rupiah_digits;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Mailbox connection failed: {0}")]
    Connect(String),

    #[error("Mailbox protocol error: {0}")]
    Protocol(String),
}

/// Source of bank notification bodies.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// Text bodies of notifications received since `since`.
    async fn fetch_recent(&self, since: DateTime<Utc>) -> Result<Vec<String>, MailboxError>;
}

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Rp\s?([0-9.]+)").expect("valid amount pattern"))
}

/// First rupiah amount quoted in a notification, e.g. `Rp 50.412`.
pub fn transfer_amount(body: &str) -> Option<Decimal> {
    let captures = amount_pattern().captures(body)?;
    parse_rupiah_digits(captures.get(1)?.as_str())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub messages: usize,
    pub settled: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct PaymentChecker {
    service: Arc<OrderService>,
    source: Arc<dyn MailboxSource>,
    clock: Arc<dyn Clock>,
    lookback: chrono::Duration,
    bank_tag: String,
}

impl PaymentChecker {
    pub fn new(
        service: Arc<OrderService>,
        source: Arc<dyn MailboxSource>,
        clock: Arc<dyn Clock>,
        lookback: chrono::Duration,
        bank_tag: impl Into<String>,
    ) -> Self {
        Self {
            service,
            source,
            clock,
            lookback,
            bank_tag: bank_tag.into(),
        }
    }

    /// One scan over recent notifications. An unreachable mailbox yields an
    /// empty report.
    pub async fn run(&self) -> ScanReport {
        let since = self.clock.now() - self.lookback;
        let bodies = match self.source.fetch_recent(since).await {
            Ok(bodies) => bodies,
            Err(e) => {
                warn!(error = %e, "Mailbox unavailable, skipping payment scan");
                return ScanReport::default();
            }
        };

        let mut report = ScanReport {
            messages: bodies.len(),
            ..ScanReport::default()
        };
        for body in &bodies {
            match self.settle(body).await {
                Ok(true) => report.settled += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(error = %e, "Failed to settle transfer from notification");
                    report.skipped += 1;
                }
            }
        }

        debug!(
            messages = report.messages,
            settled = report.settled,
            skipped = report.skipped,
            "Payment scan finished"
        );
        report
    }

    async fn settle(&self, body: &str) -> Result<bool, AppError> {
        let Some(amount) = transfer_amount(body) else {
            debug!("No transfer amount in notification");
            return Ok(false);
        };

        let candidates: Vec<Order> = self
            .service
            .pending_orders_with_total(amount)
            .await?
            .into_iter()
            .filter(|o| is_manual_transfer(&o.payment_method))
            .filter(|o| o.payment_method.contains(&self.bank_tag))
            .collect();

        match candidates.as_slice() {
            [] => {
                debug!(%amount, "No pending order for transfer amount");
                Ok(false)
            }
            [order] => {
                let paid = self.service.confirm_transfer(order.id).await?;
                info!(
                    order_number = %paid.order_number,
                    %amount,
                    "Order settled from bank notification"
                );
                Ok(true)
            }
            many => {
                let order_numbers: Vec<&str> =
                    many.iter().map(|o| o.order_number.as_str()).collect();
                warn!(
                    %amount,
                    ?order_numbers,
                    "Transfer amount matches several pending orders, needs manual review"
                );
                Ok(false)
            }
        }
    }
}

pub fn spawn(checker: PaymentChecker, every: Duration) -> JoinHandle<()> {
    spawn_periodic("payment-checker", every, move || {
        let checker = checker.clone();
        async move {
            checker.run().await;
        }
    })
}
