use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::jobs::spawn_periodic;
use crate::orders::OrderService;
use crate::utils::error::AppError;

/// Expires every pending order older than the payment window, each in its
/// own transaction. Returns how many were expired.
pub async fn sweep(service: &OrderService) -> Result<usize, AppError> {
    let cutoff = service.expiry_cutoff();
    let overdue = service.overdue_orders(cutoff).await?;

    let mut expired = 0;
    for order in overdue {
        match service.expire(order.id, cutoff).await {
            Ok(Some(_)) => expired += 1,
            Ok(None) => debug!(
                order_number = %order.order_number,
                "Order settled before expiry, skipped"
            ),
            Err(e) => warn!(
                order_number = %order.order_number,
                error = %e,
                "Failed to expire order"
            ),
        }
    }

    if expired > 0 {
        info!(expired, "Expired overdue pending orders");
    }
    Ok(expired)
}

pub fn spawn(service: Arc<OrderService>, every: Duration) -> JoinHandle<()> {
    spawn_periodic("order-expiry", every, move || {
        let service = Arc::clone(&service);
        async move {
            if let Err(e) = sweep(&service).await {
                error!(error = %e, "Order expiry sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::{OrderPolicy, PaymentConfig};
    use crate::models::{EventStatus, OrderStatus};
    use crate::notify::testing::RecordingNotifier;
    use crate::notify::Dispatcher;
    use crate::orders::{CheckoutItem, CheckoutRequest, CustomerInfo};
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn request(ticket_type_id: i64) -> CheckoutRequest {
        CheckoutRequest {
            items: vec![CheckoutItem {
                ticket_type_id,
                quantity: 1,
                attendees: Vec::new(),
            }],
            payment_method: "BCA_VA".to_string(),
            customer_info: Some(CustomerInfo {
                name: "Rina".to_string(),
                email: "rina@example.com".to_string(),
                phone: "0812".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_sweep_expires_only_overdue_pending_orders() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        ));
        let event = store
            .add_event(
                "Jazz Night",
                EventStatus::Published,
                Decimal::new(5, 0),
                clock.now() + chrono::Duration::days(3),
            )
            .await;
        let tt = store
            .add_ticket_type(event.id, "Regular", Decimal::new(50_000, 0), 10, 10)
            .await;
        let service = OrderService::new(
            Arc::new(store.clone()),
            clock.clone(),
            Dispatcher::new(Arc::new(RecordingNotifier::default())),
            OrderPolicy::default(),
            PaymentConfig::default(),
        );

        let stale = service.checkout(None, request(tt.id)).await.unwrap().order;
        let settled = service.checkout(None, request(tt.id)).await.unwrap().order;
        service.mark_paid_by_admin(settled.id).await.unwrap();
        clock.advance(chrono::Duration::minutes(20));
        let fresh = service.checkout(None, request(tt.id)).await.unwrap().order;
        clock.advance(chrono::Duration::minutes(15));

        assert_eq!(sweep(&service).await.unwrap(), 1);

        assert_eq!(store.order(stale.id).await.unwrap().status, OrderStatus::Expired);
        assert_eq!(store.order(settled.id).await.unwrap().status, OrderStatus::Paid);
        assert_eq!(store.order(fresh.id).await.unwrap().status, OrderStatus::Pending);
        assert_eq!(store.ticket_type(tt.id).await.unwrap().available, 8);

        assert_eq!(sweep(&service).await.unwrap(), 0);
    }
}
