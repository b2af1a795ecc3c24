//! In-process store.
//!
//! A transaction takes the store-wide lock and works on a copy of the data;
//! commit swaps the copy in. Transactions are therefore fully serialised,
//! which is the strongest form of the guarantees the Postgres store gives.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{
    Event, EventStatus, NewHistory, NewOrder, NewTicket, Order, OrderStatus, OrderStatusHistory,
    Ticket, TicketStatus, TicketType, User,
};
use crate::store::{Store, StoreTx};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    events: BTreeMap<i64, Event>,
    ticket_types: BTreeMap<i64, TicketType>,
    orders: BTreeMap<i64, Order>,
    tickets: BTreeMap<i64, Ticket>,
    history: Vec<OrderStatusHistory>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, name: &str, email: &str, phone: &str, role: &str) -> User {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let user = User {
            id: state.next_id(),
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            role: role.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    pub async fn add_event(
        &self,
        title: &str,
        status: EventStatus,
        fee_percentage: Decimal,
        event_date: DateTime<Utc>,
    ) -> Event {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let event = Event {
            id: state.next_id(),
            title: title.to_string(),
            venue: "Main Hall".to_string(),
            city: "Jakarta".to_string(),
            event_date,
            status,
            fee_percentage,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(event.id, event.clone());
        event
    }

    pub async fn add_ticket_type(
        &self,
        event_id: i64,
        name: &str,
        price: Decimal,
        quota: i32,
        available: i32,
    ) -> TicketType {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let ticket_type = TicketType {
            id: state.next_id(),
            event_id,
            name: name.to_string(),
            price,
            quota,
            available,
            created_at: now,
            updated_at: now,
        };
        state.ticket_types.insert(ticket_type.id, ticket_type.clone());
        ticket_type
    }

    pub async fn ticket_type(&self, id: i64) -> Option<TicketType> {
        self.state.lock().await.ticket_types.get(&id).cloned()
    }

    pub async fn event(&self, id: i64) -> Option<Event> {
        self.state.lock().await.events.get(&id).cloned()
    }

    pub async fn order(&self, id: i64) -> Option<Order> {
        self.state.lock().await.orders.get(&id).cloned()
    }

    pub async fn history(&self, order_id: i64) -> Vec<OrderStatusHistory> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_event(&mut self, id: i64) -> Result<Option<Event>, AppError> {
        Ok(self.working.events.get(&id).cloned())
    }

    async fn find_ticket_type(&mut self, id: i64) -> Result<Option<TicketType>, AppError> {
        Ok(self.working.ticket_types.get(&id).cloned())
    }

    async fn reserve_quota(
        &mut self,
        ticket_type_id: i64,
        quantity: i32,
    ) -> Result<Option<TicketType>, AppError> {
        match self.working.ticket_types.get_mut(&ticket_type_id) {
            Some(tt) if tt.available >= quantity => {
                tt.available -= quantity;
                tt.updated_at = Utc::now();
                Ok(Some(tt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn restore_quota(&mut self, ticket_type_id: i64, count: i32) -> Result<(), AppError> {
        if let Some(tt) = self.working.ticket_types.get_mut(&ticket_type_id) {
            tt.available = (tt.available + count).min(tt.quota);
            tt.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count_order_tickets_by_type(
        &mut self,
        order_id: i64,
    ) -> Result<Vec<(i64, i32)>, AppError> {
        let mut counts: BTreeMap<i64, i32> = BTreeMap::new();
        for ticket in self.working.tickets.values() {
            if ticket.order_id == Some(order_id) {
                *counts.entry(ticket.ticket_type_id).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn lock_amount_bucket(&mut self, _base_amount: Decimal) -> Result<(), AppError> {
        // The store-wide lock is already held.
        Ok(())
    }

    async fn pending_fingerprinted_totals(
        &mut self,
        low: Decimal,
        high: Decimal,
    ) -> Result<Vec<Decimal>, AppError> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.unique_code > 0)
            .filter(|o| o.total_amount >= low && o.total_amount <= high)
            .map(|o| o.total_amount)
            .collect())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, AppError> {
        if self
            .working
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(AppError::InternalServerError(format!(
                "duplicate order number {}",
                order.order_number
            )));
        }
        let inserted = Order {
            id: self.working.next_id(),
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            customer_phone: order.customer_phone.clone(),
            total_amount: order.total_amount,
            admin_fee: order.admin_fee,
            unique_code: order.unique_code,
            status: OrderStatus::Pending,
            payment_method: order.payment_method.clone(),
            virtual_account_number: order.virtual_account_number.clone(),
            payment_url: order.payment_url.clone(),
            payment_instructions: order.payment_instructions.clone(),
            payment_data: order.payment_data.clone(),
            paid_at: None,
            expires_at: order.expires_at,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        self.working.orders.insert(inserted.id, inserted.clone());
        Ok(inserted)
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<Ticket, AppError> {
        let inserted = Ticket {
            id: self.working.next_id(),
            order_id: Some(ticket.order_id),
            event_id: ticket.event_id,
            ticket_type_id: ticket.ticket_type_id,
            ticket_code: ticket.ticket_code.clone(),
            attendee_name: ticket.attendee_name.clone(),
            attendee_email: ticket.attendee_email.clone(),
            attendee_phone: ticket.attendee_phone.clone(),
            custom_field_responses: ticket.custom_field_responses.clone(),
            status: TicketStatus::Active,
            check_in_at: None,
            created_at: ticket.created_at,
            updated_at: ticket.created_at,
        };
        self.working.tickets.insert(inserted.id, inserted.clone());
        Ok(inserted)
    }

    async fn find_order(&mut self, id: i64, _for_update: bool) -> Result<Option<Order>, AppError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn find_order_by_number(
        &mut self,
        order_number: &str,
    ) -> Result<Option<Order>, AppError> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn update_order_status(
        &mut self,
        id: i64,
        status: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Order, AppError> {
        let order = self
            .working
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;
        order.status = status;
        if order.paid_at.is_none() {
            order.paid_at = paid_at;
        }
        order.updated_at = at;
        Ok(order.clone())
    }

    async fn append_history(&mut self, entry: &NewHistory) -> Result<(), AppError> {
        let id = self.working.next_id();
        self.working.history.push(OrderStatusHistory {
            id,
            order_id: entry.order_id,
            status: entry.status,
            notes: entry.notes.clone(),
            created_at: entry.created_at,
        });
        Ok(())
    }

    async fn order_history(&mut self, order_id: i64) -> Result<Vec<OrderStatusHistory>, AppError> {
        let mut rows: Vec<_> = self
            .working
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|h| (h.created_at, h.id));
        Ok(rows)
    }

    async fn order_tickets(&mut self, order_id: i64) -> Result<Vec<Ticket>, AppError> {
        Ok(self
            .working
            .tickets
            .values()
            .filter(|t| t.order_id == Some(order_id))
            .cloned()
            .collect())
    }

    async fn user_orders(&mut self, user_id: i64) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn pending_orders_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, AppError> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn pending_orders_with_total(&mut self, total: Decimal) -> Result<Vec<Order>, AppError> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.total_amount == total)
            .cloned()
            .collect())
    }

    async fn complete_past_events(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>, AppError> {
        let mut completed = Vec::new();
        for event in self.working.events.values_mut() {
            if event.status == EventStatus::Published && event.event_date < now {
                event.status = EventStatus::Completed;
                event.updated_at = now;
                completed.push(event.clone());
            }
        }
        Ok(completed)
    }

    async fn find_ticket_by_code(&mut self, code: &str) -> Result<Option<Ticket>, AppError> {
        Ok(self
            .working
            .tickets
            .values()
            .find(|t| t.ticket_code == code)
            .cloned())
    }

    async fn check_in_ticket(
        &mut self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, AppError> {
        match self.working.tickets.get_mut(&id) {
            Some(ticket) if ticket.status == TicketStatus::Active => {
                ticket.status = TicketStatus::Used;
                ticket.check_in_at = Some(at);
                ticket.updated_at = at;
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
