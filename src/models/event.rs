use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Published,
    Completed,
    Cancelled,
    SoldOut,
}

impl EventStatus {
    /// Rejection shown to a buyer when the event cannot be sold.
    /// `None` means the event is on sale.
    pub fn checkout_rejection(self) -> Option<&'static str> {
        match self {
            EventStatus::Published => None,
            EventStatus::Cancelled => Some("Sorry, this event has been cancelled."),
            EventStatus::Completed => Some("Sorry, this event has already ended."),
            EventStatus::SoldOut => Some("Sorry, tickets for this event are sold out."),
            EventStatus::Draft => Some("Sorry, this event is not available right now."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub venue: String,
    pub city: String,
    pub event_date: DateTime<Utc>,
    pub status: EventStatus,
    /// Share of each line subtotal kept as admin fee, in percent.
    pub fee_percentage: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_published_events_are_on_sale() {
        assert!(EventStatus::Published.checkout_rejection().is_none());
        for status in [
            EventStatus::Draft,
            EventStatus::Completed,
            EventStatus::Cancelled,
            EventStatus::SoldOut,
        ] {
            assert!(status.checkout_rejection().is_some(), "{status:?}");
        }
    }
}
