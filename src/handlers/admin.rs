use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::handlers::{json_body, numeric_id};
use crate::identity::Admin;
use crate::models::OrderStatus;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

pub async fn get_transaction(
    State(state): State<AppState>,
    Admin(_admin): Admin,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let order = state.orders.find_by_id(numeric_id(id)?).await?;
    Ok(success(order, "Transaction retrieved successfully"))
}

pub async fn cancel_transaction(
    State(state): State<AppState>,
    Admin(_admin): Admin,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let order = state.orders.cancel_by_admin(numeric_id(id)?).await?;
    Ok(success(order, "Transaction cancelled successfully"))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Admin(_admin): Admin,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let order = state.orders.mark_paid_by_admin(numeric_id(id)?).await?;
    Ok(success(order, "Transaction marked as paid"))
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

pub async fn update_status(
    State(state): State<AppState>,
    Admin(_admin): Admin,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusPayload>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = numeric_id(id)?;
    let target: OrderStatus = json_body(payload)?
        .status
        .parse()
        .map_err(AppError::ValidationError)?;
    let order = state.orders.update_status_by_admin(id, target).await?;
    Ok(success(order, "Transaction status updated"))
}

pub async fn resend_email(
    State(state): State<AppState>,
    Admin(_admin): Admin,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let order = state.orders.resend_tickets(numeric_id(id)?).await?;
    let message = format!("E-tickets for order {} are being resent", order.order_number);
    Ok(success(order, message))
}

pub async fn get_timeline(
    State(state): State<AppState>,
    Admin(_admin): Admin,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let timeline = state.orders.timeline(numeric_id(id)?).await?;
    Ok(success(timeline, "Timeline retrieved successfully"))
}

/// Starts one mailbox scan in the background and returns immediately.
pub async fn trigger_scraping(
    State(state): State<AppState>,
    Admin(admin): Admin,
) -> Result<Response, AppError> {
    let checker = state.payment_checker.clone().ok_or_else(|| {
        AppError::ExternalServiceError("Mailbox scanning is not configured".to_string())
    })?;

    info!(admin_id = admin.user_id, "Payment scan triggered manually");
    tokio::spawn(async move {
        let report = checker.run().await;
        info!(
            messages = report.messages,
            settled = report.settled,
            "Manual payment scan finished"
        );
    });

    Ok(empty_success("Payment scan started"))
}
