use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::fingerprint;
use crate::identity::Principal;
use crate::ledger;
use crate::models::order::order_number;
use crate::models::ticket::ticket_code;
use crate::models::{NewHistory, NewOrder, NewTicket, OrderStatus, OrderWithTickets};
use crate::orders::{OrderService, PAYMENT_EMAIL_NOTE};
use crate::payment::{self, PaymentChannel};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub payment_method: String,
    /// Contact details for guest checkout; ignored for logged-in callers.
    #[serde(default)]
    pub customer_info: Option<CustomerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutItem {
    pub ticket_type_id: i64,
    pub quantity: i32,
    #[serde(default)]
    pub attendees: Vec<AttendeeInput>,
}

/// Per-ticket overrides. Blank fields fall back to the customer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendeeInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Either a JSON string or any JSON value; stored as a JSON string.
    #[serde(default)]
    pub custom_field_responses: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

struct Customer {
    user_id: Option<i64>,
    name: String,
    email: String,
    phone: String,
}

impl CheckoutRequest {
    /// Shape checks that need no data access.
    fn validate(&self, logged_in: bool) -> Result<(), AppError> {
        if self.items.is_empty() {
            return Err(AppError::ValidationError(
                "At least one item is required".to_string(),
            ));
        }
        if self.items.iter().any(|item| item.quantity < 1) {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }
        if self.payment_method.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Payment method is required".to_string(),
            ));
        }
        if !logged_in {
            let complete = self.customer_info.as_ref().is_some_and(|info| {
                !info.name.trim().is_empty()
                    && !info.email.trim().is_empty()
                    && !info.phone.trim().is_empty()
            });
            if !complete {
                return Err(AppError::ValidationError(
                    "Customer info required for guest checkout".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn custom_fields(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(raw) if raw.is_empty() => None,
        Value::String(raw) => Some(raw.clone()),
        other => Some(other.to_string()),
    }
}

fn or_fallback(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.trim().to_string()
    }
}

impl OrderService {
    /// Reserves inventory and creates a pending order with its tickets.
    ///
    /// Everything from the first reservation to the history row is one
    /// transaction; any rejection rolls all of it back. The payment
    /// instruction email goes out after commit.
    pub async fn checkout(
        &self,
        caller: Option<&Principal>,
        request: CheckoutRequest,
    ) -> Result<OrderWithTickets, AppError> {
        request.validate(caller.is_some())?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let customer = match caller {
            Some(principal) => {
                let user = tx
                    .find_user(principal.user_id)
                    .await?
                    .ok_or_else(|| AppError::AuthError("User not found".to_string()))?;
                Customer {
                    user_id: Some(user.id),
                    name: user.name,
                    email: user.email,
                    phone: user.phone,
                }
            }
            None => {
                let info = request.customer_info.clone().unwrap_or_default();
                Customer {
                    user_id: None,
                    name: info.name.trim().to_string(),
                    email: info.email.trim().to_string(),
                    phone: info.phone.trim().to_string(),
                }
            }
        };

        let mut subtotal = Decimal::ZERO;
        let mut admin_fee = Decimal::ZERO;
        let mut drafts: Vec<NewTicket> = Vec::new();

        for item in &request.items {
            let ticket_type = tx
                .find_ticket_type(item.ticket_type_id)
                .await?
                .ok_or_else(|| AppError::ValidationError("Invalid ticket type".to_string()))?;
            let event = tx
                .find_event(ticket_type.event_id)
                .await?
                .ok_or_else(|| AppError::ValidationError("Invalid ticket type".to_string()))?;
            if let Some(message) = event.status.checkout_rejection() {
                return Err(AppError::EventUnavailable(message.to_string()));
            }

            let reserved = ledger::reserve(tx.as_mut(), &ticket_type, item.quantity).await?;

            let line = reserved.price * Decimal::from(item.quantity);
            subtotal += line;
            admin_fee += line * event.fee_percentage / Decimal::ONE_HUNDRED;

            for index in 0..item.quantity as usize {
                let attendee = item.attendees.get(index).cloned().unwrap_or_default();
                let seq = drafts.len();
                drafts.push(NewTicket {
                    order_id: 0,
                    event_id: reserved.event_id,
                    ticket_type_id: reserved.id,
                    ticket_code: ticket_code(now, reserved.id, seq),
                    attendee_name: or_fallback(&attendee.name, &customer.name),
                    attendee_email: or_fallback(&attendee.email, &customer.email),
                    attendee_phone: or_fallback(&attendee.phone, &customer.phone),
                    custom_field_responses: custom_fields(attendee.custom_field_responses.as_ref()),
                    created_at: now,
                });
            }
        }

        let channel = PaymentChannel::classify(&request.payment_method);
        // Transfers are typed in whole rupiah, so a fingerprinted total must
        // not carry a fraction the instructions cannot show.
        let admin_fee = if channel.needs_fingerprint() {
            (subtotal + admin_fee)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                - subtotal
        } else {
            admin_fee.round_dp(2)
        };
        let base_amount = subtotal + admin_fee;
        let unique_code = if channel.needs_fingerprint() {
            fingerprint::allocate(tx.as_mut(), base_amount).await?
        } else {
            0
        };
        let total_amount = base_amount + Decimal::from(unique_code);

        let number = order_number(now);
        let artifacts = payment::prepare(
            &self.payment,
            &channel,
            &number,
            customer.user_id,
            total_amount,
            now,
        );

        let order = tx
            .insert_order(&NewOrder {
                order_number: number,
                user_id: customer.user_id,
                customer_name: customer.name,
                customer_email: customer.email,
                customer_phone: customer.phone,
                total_amount,
                admin_fee,
                unique_code,
                payment_method: request.payment_method.trim().to_string(),
                virtual_account_number: artifacts.virtual_account_number,
                payment_url: artifacts.payment_url,
                payment_instructions: artifacts.payment_instructions,
                payment_data: artifacts.payment_data,
                expires_at: now + self.policy.expiry_window,
                created_at: now,
            })
            .await?;

        let mut tickets = Vec::with_capacity(drafts.len());
        for mut draft in drafts {
            draft.order_id = order.id;
            tickets.push(tx.insert_ticket(&draft).await?);
        }

        tx.append_history(&NewHistory::new(
            order.id,
            OrderStatus::Pending,
            "Order created",
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            total = %order.total_amount,
            unique_code,
            tickets = tickets.len(),
            "Order created"
        );

        self.notifier.payment_instructions(&order);
        self.record_note(order.id, OrderStatus::Pending, PAYMENT_EMAIL_NOTE)
            .await;

        Ok(OrderWithTickets { order, tickets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(items: Vec<CheckoutItem>, customer_info: Option<CustomerInfo>) -> CheckoutRequest {
        CheckoutRequest {
            items,
            payment_method: "BCA_VA".to_string(),
            customer_info,
        }
    }

    fn item(quantity: i32) -> CheckoutItem {
        CheckoutItem {
            ticket_type_id: 1,
            quantity,
            attendees: Vec::new(),
        }
    }

    #[test]
    fn test_validation_rejects_bad_shapes() {
        assert!(request(vec![], None).validate(true).is_err());
        assert!(request(vec![item(0)], None).validate(true).is_err());
        assert!(request(vec![item(1)], None).validate(false).is_err());

        let partial = CustomerInfo {
            name: "Rina".to_string(),
            email: "rina@example.com".to_string(),
            phone: " ".to_string(),
        };
        assert!(request(vec![item(1)], Some(partial)).validate(false).is_err());
        assert!(request(vec![item(1)], None).validate(true).is_ok());
    }

    #[test]
    fn test_custom_fields_accept_string_or_object() {
        assert_eq!(
            custom_fields(Some(&json!("{\"size\":\"L\"}"))).as_deref(),
            Some("{\"size\":\"L\"}")
        );
        assert_eq!(
            custom_fields(Some(&json!({"size": "L"}))).as_deref(),
            Some("{\"size\":\"L\"}")
        );
        assert_eq!(custom_fields(Some(&Value::Null)), None);
        assert_eq!(custom_fields(None), None);
    }

    #[test]
    fn test_request_deserializes_without_optional_parts() {
        let parsed: CheckoutRequest = serde_json::from_value(json!({
            "items": [{"ticket_type_id": 3, "quantity": 2}],
            "payment_method": "BANK_TRANSFER_JAGO"
        }))
        .unwrap();
        assert_eq!(parsed.items[0].quantity, 2);
        assert!(parsed.items[0].attendees.is_empty());
        assert!(parsed.customer_info.is_none());
    }
}
