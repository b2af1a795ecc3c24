use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::handlers::json_body;
use crate::identity::{Admin, Principal};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn my_tickets(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, AppError> {
    let tickets = state.tickets.tickets_of(&principal).await?;
    Ok(success(tickets, "Tickets retrieved successfully"))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let detail = state.tickets.detail(&code).await?;
    Ok(success(detail, "Ticket retrieved successfully"))
}

pub async fn verify_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let verification = state.tickets.verify(&code).await?;
    Ok(success(verification, "Ticket verified"))
}

#[derive(Debug, Deserialize)]
pub struct CheckInPayload {
    pub ticket_code: String,
}

pub async fn check_in(
    State(state): State<AppState>,
    Admin(_admin): Admin,
    payload: Result<Json<CheckInPayload>, JsonRejection>,
) -> Result<Response, AppError> {
    let payload = json_body(payload)?;
    let ticket = state.tickets.check_in(payload.ticket_code.trim()).await?;
    Ok(success(ticket, "Check-in successful"))
}
