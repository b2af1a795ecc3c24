use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::ticket::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }

    /// Paid, cancelled and expired orders accept no further transitions.
    pub fn is_final(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Terminal failures hand their reserved seats back to the ledger.
    pub fn releases_inventory(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Expired)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "expired" => Ok(OrderStatus::Expired),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub user_id: Option<i64>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    /// Amount the customer pays: subtotals, admin fee and fingerprint code.
    pub total_amount: Decimal,
    pub admin_fee: Decimal,
    /// Fingerprint suffix for manual transfers, `0` otherwise.
    pub unique_code: i32,
    pub status: OrderStatus,
    pub payment_method: String,
    pub virtual_account_number: Option<String>,
    pub payment_url: Option<String>,
    pub payment_instructions: Option<String>,
    pub payment_data: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<i64>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub total_amount: Decimal,
    pub admin_fee: Decimal,
    pub unique_code: i32,
    pub payment_method: String,
    pub virtual_account_number: Option<String>,
    pub payment_url: Option<String>,
    pub payment_instructions: Option<String>,
    pub payment_data: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Order together with the tickets it owns, as returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithTickets {
    #[serde(flatten)]
    pub order: Order,
    pub tickets: Vec<Ticket>,
}

/// Append-only audit row, one per transition or notable side effect.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistory {
    pub order_id: i64,
    pub status: OrderStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl NewHistory {
    pub fn new(order_id: i64, status: OrderStatus, notes: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            status,
            notes: notes.into(),
            created_at: at,
        }
    }
}

/// External-facing order number: unix seconds plus a random suffix so two
/// checkouts in the same second never collide.
pub fn order_number(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("ORD-{}-{}", now.timestamp(), suffix[..6].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_states() {
        assert!(!OrderStatus::Pending.is_final());
        assert!(OrderStatus::Paid.is_final());
        assert!(OrderStatus::Cancelled.is_final());
        assert!(OrderStatus::Expired.is_final());
    }

    #[test]
    fn test_only_failures_release_inventory() {
        assert!(OrderStatus::Cancelled.releases_inventory());
        assert!(OrderStatus::Expired.releases_inventory());
        assert!(!OrderStatus::Paid.releases_inventory());
        assert!(!OrderStatus::Pending.releases_inventory());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(" Paid ".parse::<OrderStatus>(), Ok(OrderStatus::Paid));
        assert!("refunded".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_numbers_are_distinct() {
        let now = Utc::now();
        let a = order_number(now);
        let b = order_number(now);
        assert!(a.starts_with(&format!("ORD-{}-", now.timestamp())));
        assert_ne!(a, b);
    }
}
