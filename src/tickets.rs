//! Ticket verification and venue check-in.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::identity::Principal;
use crate::models::{Event, Order, OrderStatus, Ticket, TicketStatus};
use crate::store::{Store, StoreTx};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct TicketVerification {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub is_valid: bool,
}

/// A ticket with the event, type and order it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub event: Event,
    pub ticket_type_name: String,
    pub order_number: Option<String>,
    pub order_status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserTickets {
    pub upcoming: Vec<TicketDetail>,
    pub past: Vec<TicketDetail>,
}

pub struct TicketDesk {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TicketDesk {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn verify(&self, code: &str) -> Result<TicketVerification, AppError> {
        let mut tx = self.store.begin().await?;
        let ticket = tx
            .find_ticket_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;
        Ok(TicketVerification {
            is_valid: ticket.status == TicketStatus::Active,
            ticket,
        })
    }

    pub async fn detail(&self, code: &str) -> Result<TicketDetail, AppError> {
        let mut tx = self.store.begin().await?;
        let ticket = tx
            .find_ticket_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;
        let order = match ticket.order_id {
            Some(order_id) => tx.find_order(order_id, false).await?,
            None => None,
        };
        describe(tx.as_mut(), ticket, order.as_ref()).await
    }

    /// Tickets of every order the caller owns, most recently paid first,
    /// split by whether the event is still ahead.
    pub async fn tickets_of(&self, owner: &Principal) -> Result<UserTickets, AppError> {
        let mut tx = self.store.begin().await?;
        let mut orders = tx.user_orders(owner.user_id).await?;
        // Unpaid orders sort last.
        orders.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));

        let now = self.clock.now();
        let mut split = UserTickets::default();
        for order in &orders {
            for ticket in tx.order_tickets(order.id).await? {
                let detail = describe(tx.as_mut(), ticket, Some(order)).await?;
                if detail.event.event_date >= now {
                    split.upcoming.push(detail);
                } else {
                    split.past.push(detail);
                }
            }
        }
        Ok(split)
    }

    /// Flips an active ticket of a paid order to used. A ticket is admitted
    /// at most once.
    pub async fn check_in(&self, code: &str) -> Result<Ticket, AppError> {
        let mut tx = self.store.begin().await?;
        let ticket = tx
            .find_ticket_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

        if ticket.status == TicketStatus::Used {
            return Err(already_used(&ticket));
        }

        let order_status = match ticket.order_id {
            Some(order_id) => tx.find_order(order_id, false).await?.map(|o| o.status),
            None => None,
        };
        if order_status != Some(OrderStatus::Paid) {
            return Err(AppError::ValidationError(
                "Ticket does not belong to a paid order".to_string(),
            ));
        }

        let now = self.clock.now();
        let checked_in = match tx.check_in_ticket(ticket.id, now).await? {
            Some(updated) => updated,
            None => return Err(already_used(&ticket)),
        };
        tx.commit().await?;

        info!(ticket_code = %checked_in.ticket_code, "Ticket checked in");
        Ok(checked_in)
    }
}

async fn describe(
    tx: &mut dyn StoreTx,
    ticket: Ticket,
    order: Option<&Order>,
) -> Result<TicketDetail, AppError> {
    let event = tx.find_event(ticket.event_id).await?.ok_or_else(|| {
        AppError::InternalServerError(format!("event {} missing", ticket.event_id))
    })?;
    let ticket_type_name = tx
        .find_ticket_type(ticket.ticket_type_id)
        .await?
        .map(|tt| tt.name)
        .unwrap_or_default();
    Ok(TicketDetail {
        ticket,
        event,
        ticket_type_name,
        order_number: order.map(|o| o.order_number.clone()),
        order_status: order.map(|o| o.status),
    })
}

fn already_used(ticket: &Ticket) -> AppError {
    let at = ticket
        .check_in_at
        .map(|t| format!(" at {}", t.format("%Y-%m-%d %H:%M:%S UTC")))
        .unwrap_or_default();
    AppError::ValidationError(format!("Ticket already used{at}"))
}
