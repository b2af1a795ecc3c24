//! Inventory ledger over ticket-type `available` counters.
//!
//! Both operations run inside the caller's transaction and hold no lock of
//! their own: reserve is a single guarded decrement, restore a single capped
//! increment per ticket type.

use tracing::debug;

use crate::models::TicketType;
use crate::store::StoreTx;
use crate::utils::error::AppError;

/// Takes `quantity` seats from `ticket_type`, or fails with
/// [`AppError::InsufficientQuota`] naming the type. Returns the row as it is
/// after the decrement.
pub async fn reserve(
    tx: &mut dyn StoreTx,
    ticket_type: &TicketType,
    quantity: i32,
) -> Result<TicketType, AppError> {
    match tx.reserve_quota(ticket_type.id, quantity).await? {
        Some(updated) => {
            debug!(
                ticket_type_id = updated.id,
                quantity,
                available = updated.available,
                "Reserved quota"
            );
            Ok(updated)
        }
        None => Err(AppError::InsufficientQuota {
            ticket_type: ticket_type.name.clone(),
        }),
    }
}

/// Hands an order's seats back, grouped by ticket type and capped at quota.
///
/// The cap stops a repeated restore from overshooting `quota`, but it does
/// not make a second restore harmless when other seats were sold in between;
/// the lifecycle machine calls this at most once per order.
pub async fn restore(tx: &mut dyn StoreTx, order_id: i64) -> Result<Vec<(i64, i32)>, AppError> {
    let counts = tx.count_order_tickets_by_type(order_id).await?;
    for (ticket_type_id, count) in &counts {
        tx.restore_quota(*ticket_type_id, *count).await?;
        debug!(order_id, ticket_type_id, count, "Restored quota");
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;
    use rust_decimal::Decimal;

    async fn store_with_type(quota: i32, available: i32) -> (MemoryStore, TicketType) {
        let store = MemoryStore::new();
        let event = store
            .add_event("Jazz Night", EventStatus::Published, Decimal::new(5, 0), Utc::now())
            .await;
        let tt = store
            .add_ticket_type(event.id, "Regular", Decimal::new(50_000, 0), quota, available)
            .await;
        (store, tt)
    }

    #[tokio::test]
    async fn test_reserve_decrements_when_enough_remain() {
        let (store, tt) = store_with_type(10, 7).await;
        let mut tx = store.begin().await.unwrap();

        let updated = reserve(tx.as_mut(), &tt, 3).await.unwrap();
        assert_eq!(updated.available, 4);
        tx.commit().await.unwrap();

        assert_eq!(store.ticket_type(tt.id).await.unwrap().available, 4);
    }

    #[tokio::test]
    async fn test_reserve_rejects_without_touching_counter() {
        let (store, tt) = store_with_type(10, 2).await;
        let mut tx = store.begin().await.unwrap();

        let err = reserve(tx.as_mut(), &tt, 3).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientQuota { ref ticket_type } if ticket_type == "Regular"));
        tx.commit().await.unwrap();

        assert_eq!(store.ticket_type(tt.id).await.unwrap().available, 2);
    }

    #[tokio::test]
    async fn test_uncommitted_reservation_is_rolled_back() {
        let (store, tt) = store_with_type(10, 5).await;
        {
            let mut tx = store.begin().await.unwrap();
            reserve(tx.as_mut(), &tt, 5).await.unwrap();
        }
        assert_eq!(store.ticket_type(tt.id).await.unwrap().available, 5);
    }

    #[tokio::test]
    async fn test_restore_is_capped_at_quota() {
        let (store, tt) = store_with_type(10, 9).await;
        let mut tx = store.begin().await.unwrap();
        tx.restore_quota(tt.id, 3).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.ticket_type(tt.id).await.unwrap().available, 10);
    }
}
