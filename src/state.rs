use std::sync::Arc;

use crate::jobs::payment_checker::PaymentChecker;
use crate::orders::OrderService;
use crate::tickets::TicketDesk;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub tickets: Arc<TicketDesk>,
    /// Present only when a mailbox is configured.
    pub payment_checker: Option<PaymentChecker>,
}
