//! Data access for the order engine.
//!
//! Every read and write goes through a [`StoreTx`] opened by [`Store::begin`].
//! A transaction that is dropped without [`StoreTx::commit`] is rolled back,
//! so an early `?` return undoes everything done so far.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{
    Event, NewHistory, NewOrder, NewTicket, Order, OrderStatus, OrderStatusHistory, Ticket,
    TicketType, User,
};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_event(&mut self, id: i64) -> Result<Option<Event>, AppError>;

    async fn find_ticket_type(&mut self, id: i64) -> Result<Option<TicketType>, AppError>;

    /// Decrements `available` by `quantity` only when at least that many
    /// remain, in one conditional statement. Returns the updated row, or
    /// `None` when the guard did not match.
    async fn reserve_quota(
        &mut self,
        ticket_type_id: i64,
        quantity: i32,
    ) -> Result<Option<TicketType>, AppError>;

    /// Adds `count` back to `available`, capped at `quota`.
    async fn restore_quota(&mut self, ticket_type_id: i64, count: i32) -> Result<(), AppError>;

    /// Ticket counts of an order grouped by ticket type.
    async fn count_order_tickets_by_type(
        &mut self,
        order_id: i64,
    ) -> Result<Vec<(i64, i32)>, AppError>;

    /// Serialises fingerprint allocation for one base amount until the
    /// transaction ends.
    async fn lock_amount_bucket(&mut self, base_amount: Decimal) -> Result<(), AppError>;

    /// Totals of pending fingerprinted orders that lie in `low..=high`.
    async fn pending_fingerprinted_totals(
        &mut self,
        low: Decimal,
        high: Decimal,
    ) -> Result<Vec<Decimal>, AppError>;

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, AppError>;

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<Ticket, AppError>;

    /// Looks an order up by id; `for_update` holds its row lock until the
    /// transaction ends.
    async fn find_order(&mut self, id: i64, for_update: bool) -> Result<Option<Order>, AppError>;

    async fn find_order_by_number(
        &mut self,
        order_number: &str,
    ) -> Result<Option<Order>, AppError>;

    async fn update_order_status(
        &mut self,
        id: i64,
        status: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Order, AppError>;

    async fn append_history(&mut self, entry: &NewHistory) -> Result<(), AppError>;

    async fn order_history(&mut self, order_id: i64) -> Result<Vec<OrderStatusHistory>, AppError>;

    async fn order_tickets(&mut self, order_id: i64) -> Result<Vec<Ticket>, AppError>;

    /// Orders owned by a user, newest first.
    async fn user_orders(&mut self, user_id: i64) -> Result<Vec<Order>, AppError>;

    async fn pending_orders_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, AppError>;

    async fn pending_orders_with_total(&mut self, total: Decimal) -> Result<Vec<Order>, AppError>;

    /// Flips published events dated before `now` to completed and returns them.
    async fn complete_past_events(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>, AppError>;

    async fn find_ticket_by_code(&mut self, code: &str) -> Result<Option<Ticket>, AppError>;

    /// Marks an active ticket used. `None` when it was not active.
    async fn check_in_ticket(
        &mut self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
