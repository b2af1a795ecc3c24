//! Order lifecycle machine.
//!
//! An order is created `pending` and moves exactly once into `paid`,
//! `cancelled` or `expired`. Every trigger (user, admin, gateway callback,
//! expiry sweep, mailbox scanner) goes through the same locked transition:
//! the status change, the ledger restore for failures and the history row
//! commit together, and notifications are dispatched only afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{OrderPolicy, PaymentConfig};
use crate::identity::Principal;
use crate::ledger;
use crate::models::{NewHistory, Order, OrderStatus, OrderStatusHistory, OrderWithTickets, Ticket};
use crate::notify::{Dispatcher, IssuedTicket};
use crate::store::{Store, StoreTx};
use crate::utils::error::AppError;

mod checkout;

pub use checkout::{AttendeeInput, CheckoutItem, CheckoutRequest, CustomerInfo};

pub const TICKET_EMAIL_NOTE: &str = "E-ticket email sent to customer";
pub const PAYMENT_EMAIL_NOTE: &str = "Payment instruction email sent to customer";

/// What moved the order. Decides the error wording, the history note and
/// which email follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    UserCancel,
    AdminCancel,
    AdminMarkPaid,
    AdminStatusUpdate,
    CallbackSuccess,
    CallbackFailed,
    Expiry,
    EmailMatch,
}

impl Trigger {
    fn action(self) -> &'static str {
        match self {
            Trigger::UserCancel | Trigger::AdminCancel => "cancel order",
            Trigger::AdminMarkPaid => "mark order as paid",
            Trigger::AdminStatusUpdate => "update order status",
            Trigger::CallbackSuccess | Trigger::CallbackFailed => "apply payment callback",
            Trigger::Expiry => "expire order",
            Trigger::EmailMatch => "confirm transfer",
        }
    }

    fn note(self) -> &'static str {
        match self {
            Trigger::UserCancel => "Cancelled by user",
            Trigger::AdminCancel => "Cancelled by admin",
            Trigger::AdminMarkPaid => "Marked as paid by admin",
            Trigger::AdminStatusUpdate => "Status updated by admin",
            Trigger::CallbackSuccess => "Callback received: success",
            Trigger::CallbackFailed => "Callback received: failed",
            Trigger::Expiry => "Expired after payment window",
            Trigger::EmailMatch => "Verified automatically via email",
        }
    }

    /// Reason quoted in the cancellation email; `None` sends nothing.
    fn cancel_reason(self, target: OrderStatus) -> Option<&'static str> {
        match (self, target) {
            (Trigger::UserCancel, _) => Some("Cancelled by user"),
            (Trigger::AdminCancel, _) => Some("Cancelled by admin"),
            (Trigger::AdminStatusUpdate, OrderStatus::Cancelled) => Some("Cancelled by admin"),
            (Trigger::AdminStatusUpdate, OrderStatus::Expired) | (Trigger::Expiry, _) => {
                Some("Payment window expired")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Success,
    Failed,
}

enum OrderRef<'a> {
    Id(i64),
    Number(&'a str),
}

pub struct OrderService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Dispatcher,
    policy: OrderPolicy,
    payment: PaymentConfig,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Dispatcher,
        policy: OrderPolicy,
        payment: PaymentConfig,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            policy,
            payment,
        }
    }

    /// Looks an order up by order number first, then by numeric id.
    ///
    /// An order number is enough to read a guest order. Orders owned by a
    /// user are hidden from other logged-in non-admins. Lookup by id needs a
    /// login and only returns the caller's own orders unless they are admin.
    pub async fn find_by_reference(
        &self,
        viewer: Option<&Principal>,
        reference: &str,
    ) -> Result<OrderWithTickets, AppError> {
        let mut tx = self.store.begin().await?;

        if let Some(order) = tx.find_order_by_number(reference).await? {
            if let Some(viewer) = viewer {
                if !viewer.can_view(order.user_id) {
                    return Err(AppError::Forbidden(
                        "You are not authorized to view this order".to_string(),
                    ));
                }
            }
            let tickets = tx.order_tickets(order.id).await?;
            return Ok(OrderWithTickets { order, tickets });
        }

        if let Ok(id) = reference.parse::<i64>() {
            let viewer = viewer.ok_or_else(|| {
                AppError::AuthError("Login required to access order by ID".to_string())
            })?;
            if let Some(order) = tx.find_order(id, false).await? {
                if viewer.is_admin() || order.user_id == Some(viewer.user_id) {
                    let tickets = tx.order_tickets(order.id).await?;
                    return Ok(OrderWithTickets { order, tickets });
                }
            }
        }

        Err(AppError::NotFound("Order not found".to_string()))
    }

    pub async fn order_tickets(
        &self,
        viewer: Option<&Principal>,
        reference: &str,
    ) -> Result<Vec<Ticket>, AppError> {
        Ok(self.find_by_reference(viewer, reference).await?.tickets)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<OrderWithTickets, AppError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order(id, false)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
        let tickets = tx.order_tickets(order.id).await?;
        Ok(OrderWithTickets { order, tickets })
    }

    /// The caller's own orders with their tickets, newest first.
    pub async fn orders_of(&self, owner: &Principal) -> Result<Vec<OrderWithTickets>, AppError> {
        let mut tx = self.store.begin().await?;
        let orders = tx.user_orders(owner.user_id).await?;
        let mut listed = Vec::with_capacity(orders.len());
        for order in orders {
            let tickets = tx.order_tickets(order.id).await?;
            listed.push(OrderWithTickets { order, tickets });
        }
        Ok(listed)
    }

    /// Sends the e-tickets of a paid order again, one email per ticket.
    pub async fn resend_tickets(&self, id: i64) -> Result<Order, AppError> {
        let order = {
            let mut tx = self.store.begin().await?;
            tx.find_order(id, false)
                .await?
                .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?
        };
        if order.status != OrderStatus::Paid {
            return Err(AppError::ValidationError(format!(
                "E-tickets are only issued for paid orders, this order is {}",
                order.status
            )));
        }

        let issued = self.issued_tickets(order.id).await?;
        info!(
            order_number = %order.order_number,
            tickets = issued.len(),
            "Resending e-tickets"
        );
        self.notifier.tickets_issued(&order, issued);
        self.record_note(order.id, OrderStatus::Paid, TICKET_EMAIL_NOTE)
            .await;
        Ok(order)
    }

    /// History rows of an order, oldest first.
    pub async fn timeline(&self, id: i64) -> Result<Vec<OrderStatusHistory>, AppError> {
        let mut tx = self.store.begin().await?;
        if tx.find_order(id, false).await?.is_none() {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        tx.order_history(id).await
    }

    pub async fn cancel_by_user(
        &self,
        viewer: Option<&Principal>,
        order_number: &str,
    ) -> Result<Order, AppError> {
        let mut tx = self.store.begin().await?;
        let current = lock(tx.as_mut(), OrderRef::Number(order_number)).await?;
        if let Some(viewer) = viewer {
            if !viewer.can_view(current.user_id) {
                return Err(AppError::Forbidden(
                    "You are not authorized to cancel this order".to_string(),
                ));
            }
        }
        self.settle(tx, current, OrderStatus::Cancelled, Trigger::UserCancel)
            .await
    }

    pub async fn cancel_by_admin(&self, id: i64) -> Result<Order, AppError> {
        self.transition(OrderRef::Id(id), OrderStatus::Cancelled, Trigger::AdminCancel)
            .await
    }

    pub async fn mark_paid_by_admin(&self, id: i64) -> Result<Order, AppError> {
        self.transition(OrderRef::Id(id), OrderStatus::Paid, Trigger::AdminMarkPaid)
            .await
    }

    /// Moves a pending order into any terminal state. `pending` itself is
    /// not a valid target.
    pub async fn update_status_by_admin(
        &self,
        id: i64,
        target: OrderStatus,
    ) -> Result<Order, AppError> {
        if !target.is_final() {
            return Err(AppError::ValidationError(format!(
                "Status must be one of paid, cancelled or expired, got {target}"
            )));
        }
        self.transition(OrderRef::Id(id), target, Trigger::AdminStatusUpdate)
            .await
    }

    pub async fn apply_callback(
        &self,
        order_number: &str,
        status: CallbackStatus,
    ) -> Result<Order, AppError> {
        let (target, trigger) = match status {
            CallbackStatus::Success => (OrderStatus::Paid, Trigger::CallbackSuccess),
            CallbackStatus::Failed => (OrderStatus::Cancelled, Trigger::CallbackFailed),
        };
        self.transition(OrderRef::Number(order_number), target, trigger)
            .await
    }

    /// Settles a manual transfer matched from a bank notification.
    pub async fn confirm_transfer(&self, id: i64) -> Result<Order, AppError> {
        self.transition(OrderRef::Id(id), OrderStatus::Paid, Trigger::EmailMatch)
            .await
    }

    /// Orders created at or before this instant are overdue.
    pub fn expiry_cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - self.policy.expiry_window
    }

    pub async fn overdue_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, AppError> {
        let mut tx = self.store.begin().await?;
        tx.pending_orders_created_before(cutoff).await
    }

    pub async fn pending_orders_with_total(&self, total: Decimal) -> Result<Vec<Order>, AppError> {
        let mut tx = self.store.begin().await?;
        tx.pending_orders_with_total(total).await
    }

    /// Expires one overdue order. Returns `None` when, under the row lock,
    /// the order turns out to be settled already or no longer overdue.
    pub async fn expire(&self, id: i64, cutoff: DateTime<Utc>) -> Result<Option<Order>, AppError> {
        let mut tx = self.store.begin().await?;
        let current = lock(tx.as_mut(), OrderRef::Id(id)).await?;
        if current.status != OrderStatus::Pending || current.created_at > cutoff {
            return Ok(None);
        }
        self.settle(tx, current, OrderStatus::Expired, Trigger::Expiry)
            .await
            .map(Some)
    }

    async fn transition(
        &self,
        reference: OrderRef<'_>,
        target: OrderStatus,
        trigger: Trigger,
    ) -> Result<Order, AppError> {
        let mut tx = self.store.begin().await?;
        let current = lock(tx.as_mut(), reference).await?;
        self.settle(tx, current, target, trigger).await
    }

    /// Applies the transition to a locked order and commits.
    async fn settle(
        &self,
        mut tx: Box<dyn StoreTx>,
        current: Order,
        target: OrderStatus,
        trigger: Trigger,
    ) -> Result<Order, AppError> {
        if current.status.is_final() {
            return Err(AppError::FinalState {
                action: trigger.action(),
                status: current.status,
            });
        }

        let now = self.clock.now();
        let paid_at = (target == OrderStatus::Paid).then_some(now);
        let updated = tx
            .update_order_status(current.id, target, paid_at, now)
            .await?;
        if target.releases_inventory() {
            ledger::restore(tx.as_mut(), current.id).await?;
        }
        tx.append_history(&NewHistory::new(current.id, target, trigger.note(), now))
            .await?;
        tx.commit().await?;

        info!(
            order_number = %updated.order_number,
            from = %current.status,
            to = %target,
            trigger = ?trigger,
            "Order transitioned"
        );

        if target == OrderStatus::Paid {
            self.send_tickets(&updated).await;
        } else if let Some(reason) = trigger.cancel_reason(target) {
            self.notifier.order_cancelled(&updated, reason);
        }

        Ok(updated)
    }

    /// Dispatches one e-ticket email per ticket of a paid order.
    async fn send_tickets(&self, order: &Order) {
        match self.issued_tickets(order.id).await {
            Ok(issued) => {
                self.notifier.tickets_issued(order, issued);
                self.record_note(order.id, OrderStatus::Paid, TICKET_EMAIL_NOTE)
                    .await;
            }
            Err(e) => warn!(
                order_number = %order.order_number,
                error = %e,
                "Failed to load tickets for e-ticket email"
            ),
        }
    }

    async fn issued_tickets(&self, order_id: i64) -> Result<Vec<IssuedTicket>, AppError> {
        let mut tx = self.store.begin().await?;
        let tickets = tx.order_tickets(order_id).await?;

        let mut events = BTreeMap::new();
        let mut type_names = BTreeMap::new();
        let mut issued = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            if !events.contains_key(&ticket.event_id) {
                let event = tx.find_event(ticket.event_id).await?.ok_or_else(|| {
                    AppError::InternalServerError(format!("event {} missing", ticket.event_id))
                })?;
                events.insert(ticket.event_id, event);
            }
            if !type_names.contains_key(&ticket.ticket_type_id) {
                let name = tx
                    .find_ticket_type(ticket.ticket_type_id)
                    .await?
                    .map(|tt| tt.name)
                    .unwrap_or_default();
                type_names.insert(ticket.ticket_type_id, name);
            }
            issued.push(IssuedTicket {
                event: events[&ticket.event_id].clone(),
                ticket_type_name: type_names[&ticket.ticket_type_id].clone(),
                ticket,
            });
        }
        Ok(issued)
    }

    /// Appends a history row outside any transition. Failures are logged;
    /// the row documents a side effect and must not undo it.
    async fn record_note(&self, order_id: i64, status: OrderStatus, note: &str) {
        let result = async {
            let mut tx = self.store.begin().await?;
            tx.append_history(&NewHistory::new(order_id, status, note, self.clock.now()))
                .await?;
            tx.commit().await
        }
        .await;
        if let Err(e) = result {
            warn!(order_id, note, error = %e, "Failed to record order history");
        }
    }
}

async fn lock(tx: &mut dyn StoreTx, reference: OrderRef<'_>) -> Result<Order, AppError> {
    let id = match reference {
        OrderRef::Id(id) => id,
        OrderRef::Number(number) => match tx.find_order_by_number(number).await? {
            Some(order) => order.id,
            None => return Err(AppError::NotFound("Order not found".to_string())),
        },
    };
    tx.find_order(id, true)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}
