use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{
    Event, NewHistory, NewOrder, NewTicket, Order, OrderStatus, OrderStatusHistory, Ticket,
    TicketStatus, TicketType, User,
};
use crate::store::{Store, StoreTx};
use crate::utils::error::AppError;

/// Namespace for `pg_advisory_xact_lock(int, int)` keys taken by the
/// fingerprint allocator.
const AMOUNT_BUCKET_LOCK: i32 = 0x5449_4b54;

const ORDER_COLUMNS: &str = "id, order_number, user_id, customer_name, customer_email, \
    customer_phone, total_amount, admin_fee, unique_code, status, payment_method, \
    virtual_account_number, payment_url, payment_instructions, payment_data, paid_at, \
    expires_at, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, order_id, event_id, ticket_type_id, ticket_code, \
    attendee_name, attendee_email, attendee_phone, custom_field_responses, status, \
    check_in_at, created_at, updated_at";

const TICKET_TYPE_COLUMNS: &str =
    "id, event_id, name, price, quota, available, created_at, updated_at";

const EVENT_COLUMNS: &str =
    "id, title, venue, city, event_date, status, fee_percentage, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, phone, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn find_event(&mut self, id: i64) -> Result<Option<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let event = sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(event)
    }

    async fn find_ticket_type(&mut self, id: i64) -> Result<Option<TicketType>, AppError> {
        let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1");
        let ticket_type = sqlx::query_as::<_, TicketType>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(ticket_type)
    }

    async fn reserve_quota(
        &mut self,
        ticket_type_id: i64,
        quantity: i32,
    ) -> Result<Option<TicketType>, AppError> {
        let sql = format!(
            "UPDATE ticket_types SET available = available - $2, updated_at = NOW() \
             WHERE id = $1 AND available >= $2 RETURNING {TICKET_TYPE_COLUMNS}"
        );
        let reserved = sqlx::query_as::<_, TicketType>(&sql)
            .bind(ticket_type_id)
            .bind(quantity)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(reserved)
    }

    async fn restore_quota(&mut self, ticket_type_id: i64, count: i32) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE ticket_types SET available = LEAST(quota, available + $2), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(ticket_type_id)
        .bind(count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn count_order_tickets_by_type(
        &mut self,
        order_id: i64,
    ) -> Result<Vec<(i64, i32)>, AppError> {
        let counts = sqlx::query_as::<_, (i64, i32)>(
            "SELECT ticket_type_id, COUNT(*)::INT FROM tickets WHERE order_id = $1 \
             GROUP BY ticket_type_id ORDER BY ticket_type_id",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(counts)
    }

    async fn lock_amount_bucket(&mut self, base_amount: Decimal) -> Result<(), AppError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
            .bind(AMOUNT_BUCKET_LOCK)
            .bind(base_amount.normalize().to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn pending_fingerprinted_totals(
        &mut self,
        low: Decimal,
        high: Decimal,
    ) -> Result<Vec<Decimal>, AppError> {
        let totals = sqlx::query_scalar::<_, Decimal>(
            "SELECT DISTINCT total_amount FROM orders \
             WHERE status = $1 AND unique_code > 0 \
               AND total_amount >= $2 AND total_amount <= $3",
        )
        .bind(OrderStatus::Pending)
        .bind(low)
        .bind(high)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(totals)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, AppError> {
        let sql = format!(
            "INSERT INTO orders (order_number, user_id, customer_name, customer_email, \
             customer_phone, total_amount, admin_fee, unique_code, status, payment_method, \
             virtual_account_number, payment_url, payment_instructions, payment_data, \
             expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16) \
             RETURNING {ORDER_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Order>(&sql)
            .bind(&order.order_number)
            .bind(order.user_id)
            .bind(&order.customer_name)
            .bind(&order.customer_email)
            .bind(&order.customer_phone)
            .bind(order.total_amount)
            .bind(order.admin_fee)
            .bind(order.unique_code)
            .bind(OrderStatus::Pending)
            .bind(&order.payment_method)
            .bind(&order.virtual_account_number)
            .bind(&order.payment_url)
            .bind(&order.payment_instructions)
            .bind(&order.payment_data)
            .bind(order.expires_at)
            .bind(order.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(inserted)
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<Ticket, AppError> {
        let sql = format!(
            "INSERT INTO tickets (order_id, event_id, ticket_type_id, ticket_code, \
             attendee_name, attendee_email, attendee_phone, custom_field_responses, status, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
             RETURNING {TICKET_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Ticket>(&sql)
            .bind(ticket.order_id)
            .bind(ticket.event_id)
            .bind(ticket.ticket_type_id)
            .bind(&ticket.ticket_code)
            .bind(&ticket.attendee_name)
            .bind(&ticket.attendee_email)
            .bind(&ticket.attendee_phone)
            .bind(&ticket.custom_field_responses)
            .bind(TicketStatus::Active)
            .bind(ticket.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(inserted)
    }

    async fn find_order(&mut self, id: i64, for_update: bool) -> Result<Option<Order>, AppError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{lock}");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(order)
    }

    async fn find_order_by_number(
        &mut self,
        order_number: &str,
    ) -> Result<Option<Order>, AppError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_number)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(order)
    }

    async fn update_order_status(
        &mut self,
        id: i64,
        status: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Order, AppError> {
        let sql = format!(
            "UPDATE orders SET status = $2, paid_at = COALESCE(paid_at, $3), updated_at = $4 \
             WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(status)
            .bind(paid_at)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await?;
        updated.ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))
    }

    async fn append_history(&mut self, entry: &NewHistory) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO order_status_histories (order_id, status, notes, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.order_id)
        .bind(entry.status)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn order_history(&mut self, order_id: i64) -> Result<Vec<OrderStatusHistory>, AppError> {
        let rows = sqlx::query_as::<_, OrderStatusHistory>(
            "SELECT id, order_id, status, notes, created_at FROM order_status_histories \
             WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn order_tickets(&mut self, order_id: i64) -> Result<Vec<Ticket>, AppError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE order_id = $1 ORDER BY id");
        let tickets = sqlx::query_as::<_, Ticket>(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(tickets)
    }

    async fn user_orders(&mut self, user_id: i64) -> Result<Vec<Order>, AppError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(orders)
    }

    async fn pending_orders_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, AppError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND created_at <= $2 ORDER BY id"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(OrderStatus::Pending)
            .bind(cutoff)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(orders)
    }

    async fn pending_orders_with_total(&mut self, total: Decimal) -> Result<Vec<Order>, AppError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND total_amount = $2 ORDER BY id"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(OrderStatus::Pending)
            .bind(total)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(orders)
    }

    async fn complete_past_events(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>, AppError> {
        let sql = format!(
            "UPDATE events SET status = 'completed', updated_at = $1 \
             WHERE status = 'published' AND event_date < $1 RETURNING {EVENT_COLUMNS}"
        );
        let events = sqlx::query_as::<_, Event>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(events)
    }

    async fn find_ticket_by_code(&mut self, code: &str) -> Result<Option<Ticket>, AppError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_code = $1");
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(ticket)
    }

    async fn check_in_ticket(
        &mut self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, AppError> {
        let sql = format!(
            "UPDATE tickets SET status = $2, check_in_at = $3, updated_at = $3 \
             WHERE id = $1 AND status = $4 RETURNING {TICKET_COLUMNS}"
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .bind(TicketStatus::Used)
            .bind(at)
            .bind(TicketStatus::Active)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(ticket)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
