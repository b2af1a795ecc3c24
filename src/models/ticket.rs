use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A priced admission category with its own sellable quota.
///
/// `available` stays within `0..=quota`; it is only changed by the inventory
/// ledger's guarded reserve and capped restore.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketType {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price: Decimal,
    pub quota: i32,
    pub available: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    pub fn sold(&self) -> i32 {
        self.quota - self.available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Used,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub order_id: Option<i64>,
    pub event_id: i64,
    pub ticket_type_id: i64,
    pub ticket_code: String,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: String,
    pub custom_field_responses: Option<String>,
    pub status: TicketStatus,
    pub check_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub order_id: i64,
    pub event_id: i64,
    pub ticket_type_id: i64,
    pub ticket_code: String,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: String,
    pub custom_field_responses: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Composite, non-sequential ticket code: timestamp, type and seat index.
pub fn ticket_code(now: DateTime<Utc>, ticket_type_id: i64, index: usize) -> String {
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1_000);
    format!("T-{nanos}-{ticket_type_id}-{index}")
}
