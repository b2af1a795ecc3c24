use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{admin, health_check, orders, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = api_routes();
    let prefix = config.api_prefix.trim_end_matches('/');

    let router = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(prefix, api)
    };

    router
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.cors_allowed_origins))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            get(orders::list_my_orders).post(orders::create_order),
        )
        .route("/orders/payment-callback", post(orders::payment_callback))
        .route("/orders/:reference", get(orders::get_order))
        .route("/orders/:reference/tickets", get(orders::get_order_tickets))
        .route("/orders/:reference/cancel", post(orders::cancel_order))
        .route("/tickets/check-in", post(tickets::check_in))
        .route("/tickets/my-tickets", get(tickets::my_tickets))
        .route("/tickets/:code", get(tickets::get_ticket))
        .route("/tickets/:code/verify", get(tickets::verify_ticket))
        .route(
            "/admin/transactions/trigger-scraping",
            post(admin::trigger_scraping),
        )
        .route("/admin/transactions/:id", get(admin::get_transaction))
        .route("/admin/transactions/:id/cancel", post(admin::cancel_transaction))
        .route("/admin/transactions/:id/mark-paid", post(admin::mark_paid))
        .route("/admin/transactions/:id/status", put(admin::update_status))
        .route(
            "/admin/transactions/:id/resend-email",
            post(admin::resend_email),
        )
        .route("/admin/transactions/:id/timeline", get(admin::get_timeline))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{OrderPolicy, PaymentConfig};
    use crate::identity::{USER_ID_HEADER, USER_ROLE_HEADER};
    use crate::models::EventStatus;
    use crate::notify::testing::RecordingNotifier;
    use crate::notify::Dispatcher;
    use crate::orders::OrderService;
    use crate::store::MemoryStore;
    use crate::tickets::TicketDesk;

    struct Harness {
        app: Router,
        ticket_type_id: i64,
    }

    async fn harness() -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        ));
        let event = store
            .add_event(
                "Jazz Night",
                EventStatus::Published,
                Decimal::new(5000, 0),
                Utc.with_ymd_and_hms(2026, 11, 1, 19, 0, 0).unwrap(),
            )
            .await;
        let ticket_type = store
            .add_ticket_type(event.id, "Regular", Decimal::new(100_000, 0), 10, 10)
            .await;
        let store = Arc::new(store);

        let notifier = Dispatcher::new(Arc::new(RecordingNotifier::default()));
        let orders = Arc::new(OrderService::new(
            store.clone(),
            clock.clone(),
            notifier,
            OrderPolicy::default(),
            PaymentConfig::default(),
        ));
        let tickets = Arc::new(TicketDesk::new(store, clock));
        let state = AppState {
            orders,
            tickets,
            payment_checker: None,
        };

        let config = Config::from_lookup(|_| None);
        Harness {
            app: create_routes(state, &config),
            ticket_type_id: ticket_type.id,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn checkout_body(ticket_type_id: i64) -> String {
        json!({
            "items": [{
                "ticket_type_id": ticket_type_id,
                "quantity": 1,
                "attendees": [{
                    "name": "Rina",
                    "email": "rina@example.com",
                    "phone": "0812000111"
                }]
            }],
            "payment_method": "BANK_TRANSFER_JAGO",
            "customer_info": {
                "name": "Rina",
                "email": "rina@example.com",
                "phone": "0812000111"
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn health_is_served_outside_the_prefix() {
        let h = harness().await;
        let response = h
            .app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn guest_checkout_returns_created_order() {
        let h = harness().await;
        let request = Request::post("/api/v1/orders")
            .header("content-type", "application/json")
            .body(Body::from(checkout_body(h.ticket_type_id)))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["tickets"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let h = harness().await;
        let request = Request::post("/api/v1/orders")
            .header("content-type", "application/json")
            .body(Body::from("{\"items\": 3}"))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn admin_routes_require_identity_and_role() {
        let h = harness().await;

        let anonymous = h
            .app
            .clone()
            .oneshot(
                Request::get("/api/v1/admin/transactions/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let customer = h
            .app
            .oneshot(
                Request::get("/api/v1/admin/transactions/1")
                    .header(USER_ID_HEADER, "7")
                    .header(USER_ROLE_HEADER, "user")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(customer.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn trigger_scraping_without_mailbox_is_unavailable() {
        let h = harness().await;
        let response = h
            .app
            .oneshot(
                Request::post("/api/v1/admin/transactions/trigger-scraping")
                    .header(USER_ID_HEADER, "1")
                    .header(USER_ROLE_HEADER, "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_server_error());
    }

    #[tokio::test]
    async fn account_listings_need_a_login() {
        let h = harness().await;

        let anonymous = h
            .app
            .clone()
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let orders = h
            .app
            .clone()
            .oneshot(
                Request::get("/api/v1/orders")
                    .header(USER_ID_HEADER, "7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(orders.status(), StatusCode::OK);
        assert_eq!(body_json(orders).await["data"], json!([]));

        let tickets = h
            .app
            .oneshot(
                Request::get("/api/v1/tickets/my-tickets")
                    .header(USER_ID_HEADER, "7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(tickets.status(), StatusCode::OK);
        let body = body_json(tickets).await;
        assert_eq!(body["data"]["upcoming"], json!([]));
        assert_eq!(body["data"]["past"], json!([]));
    }

    #[tokio::test]
    async fn unknown_ticket_detail_is_not_found() {
        let h = harness().await;
        let response = h
            .app
            .oneshot(
                Request::get("/api/v1/tickets/T-0-0-0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
