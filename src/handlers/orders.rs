use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::handlers::json_body;
use crate::identity::Principal;
use crate::orders::{CallbackStatus, CheckoutRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_order(
    State(state): State<AppState>,
    principal: Option<Principal>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let order = state.orders.checkout(principal.as_ref(), request).await?;
    Ok(created(order, "Order created successfully"))
}

pub async fn list_my_orders(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, AppError> {
    let orders = state.orders.orders_of(&principal).await?;
    Ok(success(orders, "Orders retrieved successfully"))
}

pub async fn get_order(
    State(state): State<AppState>,
    principal: Option<Principal>,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let order = state
        .orders
        .find_by_reference(principal.as_ref(), &reference)
        .await?;
    Ok(success(order, "Order retrieved successfully"))
}

pub async fn get_order_tickets(
    State(state): State<AppState>,
    principal: Option<Principal>,
    Path(reference): Path<String>,
) -> Result<Response, AppError> {
    let tickets = state
        .orders
        .order_tickets(principal.as_ref(), &reference)
        .await?;
    Ok(success(tickets, "Tickets retrieved successfully"))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    principal: Option<Principal>,
    Path(order_number): Path<String>,
) -> Result<Response, AppError> {
    let order = state
        .orders
        .cancel_by_user(principal.as_ref(), &order_number)
        .await?;
    Ok(success(order, "Order cancelled successfully"))
}

#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    pub order_number: String,
    pub status: CallbackStatus,
}

/// Payment gateway webhook.
pub async fn payment_callback(
    State(state): State<AppState>,
    payload: Result<Json<CallbackPayload>, JsonRejection>,
) -> Result<Response, AppError> {
    let callback = json_body(payload)?;
    let order = state
        .orders
        .apply_callback(&callback.order_number, callback.status)
        .await?;
    Ok(success(order, "Callback processed"))
}
