//! Rendered customer emails.

use crate::models::Order;
use crate::notify::IssuedTicket;
use crate::utils::money::format_rupiah;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
{body}
    </div>
</body>
</html>"#
    )
}

/// Minimal escaping for values interpolated into the HTML body.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Flattens stored custom-field answers, either a JSON object or a list of
/// `{label|key, value}` entries, into label/value pairs.
pub fn custom_field_lines(raw: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw.filter(|r| !r.is_empty() && *r != "null") else {
        return Vec::new();
    };
    let render = |value: &serde_json::Value| match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(label, value)| (label.clone(), render(value)))
            .collect(),
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let label = item
                    .get("label")
                    .or_else(|| item.get("key"))
                    .and_then(|l| l.as_str())
                    .filter(|l| !l.is_empty())?;
                let value = item.get("value").filter(|v| !v.is_null())?;
                Some((label.to_string(), render(value)))
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn ticket_email(order: &Order, issued: &IssuedTicket) -> Email {
    let ticket = &issued.ticket;
    let extras: String = custom_field_lines(ticket.custom_field_responses.as_deref())
        .iter()
        .map(|(label, value)| {
            format!(
                "        <p><strong>{}:</strong> {}</p>\n",
                escape(label),
                escape(value)
            )
        })
        .collect();
    let body = format!(
        "        <h2>Your e-ticket</h2>\n\
         <p>Hi {name}, your payment for order #{order_number} is confirmed.</p>\n\
         <p><strong>Event:</strong> {event}</p>\n\
         <p><strong>Date:</strong> {date}</p>\n\
         <p><strong>Venue:</strong> {venue}, {city}</p>\n\
         <p><strong>Ticket type:</strong> {ticket_type}</p>\n\
         <p><strong>Ticket code:</strong> {code}</p>\n{extras}",
        name = escape(&ticket.attendee_name),
        order_number = escape(&order.order_number),
        event = escape(&issued.event.title),
        date = issued.event.event_date.format("%d %b %Y"),
        venue = escape(&issued.event.venue),
        city = escape(&issued.event.city),
        ticket_type = escape(&issued.ticket_type_name),
        code = escape(&ticket.ticket_code),
    );
    Email {
        to: ticket.attendee_email.clone(),
        subject: format!(
            "Your e-ticket for {} - #{}",
            issued.event.title, order.order_number
        ),
        html: layout("Your e-ticket", &body),
    }
}

pub fn payment_email(order: &Order, frontend_url: &str) -> Email {
    let mut details = String::new();
    if let Some(account) = &order.virtual_account_number {
        details.push_str(&format!(
            "        <p><strong>Account / payment code:</strong> {}</p>\n",
            escape(account)
        ));
    }
    if let Some(url) = &order.payment_url {
        details.push_str(&format!(
            "        <p><a href=\"{0}\">{0}</a></p>\n",
            escape(url)
        ));
    }
    if let Some(instructions) = &order.payment_instructions {
        details.push_str(&format!("        <p>{}</p>\n", escape(instructions)));
    }
    let body = format!(
        "        <h2>Complete your payment</h2>\n\
         <p>Hi {name}, thank you for your order #{order_number}.</p>\n\
         <p><strong>Total:</strong> {total}</p>\n\
         <p><strong>Payment method:</strong> {method}</p>\n{details}\
         <p>Please pay before {expires}.</p>\n\
         <p><a href=\"{checkout}\">View your order</a></p>\n",
        name = escape(&order.customer_name),
        order_number = escape(&order.order_number),
        total = format_rupiah(order.total_amount),
        method = escape(&order.payment_method),
        expires = order.expires_at.format("%d %b %Y, %H:%M UTC"),
        checkout = escape(&format!(
            "{}/payment/{}",
            frontend_url.trim_end_matches('/'),
            order.order_number
        )),
    );
    Email {
        to: order.customer_email.clone(),
        subject: format!("Payment instructions for order #{}", order.order_number),
        html: layout("Payment instructions", &body),
    }
}

pub fn cancellation_email(order: &Order, reason: &str) -> Email {
    let body = format!(
        "        <h2>Order cancelled</h2>\n\
         <p>Hi {name}, your order #{order_number} ({total}) has been cancelled.</p>\n\
         <p><strong>Reason:</strong> {reason}</p>\n",
        name = escape(&order.customer_name),
        order_number = escape(&order.order_number),
        total = format_rupiah(order.total_amount),
        reason = escape(reason),
    );
    Email {
        to: order.customer_email.clone(),
        subject: format!("Order cancelled - {}", order.order_number),
        html: layout("Order cancelled", &body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventStatus, OrderStatus, Ticket, TicketStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_number: "ORD-1-ABC123".to_string(),
            user_id: None,
            customer_name: "Rina <script>".to_string(),
            customer_email: "rina@example.com".to_string(),
            customer_phone: "0812".to_string(),
            total_amount: Decimal::new(52_603, 0),
            admin_fee: Decimal::new(2_500, 0),
            unique_code: 103,
            status: OrderStatus::Pending,
            payment_method: "BANK_TRANSFER_JAGO".to_string(),
            virtual_account_number: Some("1010101020".to_string()),
            payment_url: None,
            payment_instructions: Some("Transfer exactly".to_string()),
            payment_data: None,
            paid_at: None,
            expires_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_payment_email_quotes_total_and_escapes() {
        let email = payment_email(&order(), "https://shop.example.test/");
        assert_eq!(email.to, "rina@example.com");
        assert_eq!(email.subject, "Payment instructions for order #ORD-1-ABC123");
        assert!(email.html.contains("Rp 52.603"));
        assert!(email.html.contains("Rina &lt;script&gt;"));
        assert!(email
            .html
            .contains("https://shop.example.test/payment/ORD-1-ABC123"));
    }

    #[test]
    fn test_ticket_email_goes_to_attendee() {
        let now = Utc::now();
        let issued = IssuedTicket {
            ticket: Ticket {
                id: 5,
                order_id: Some(1),
                event_id: 2,
                ticket_type_id: 3,
                ticket_code: "T-1-3-0".to_string(),
                attendee_name: "Budi".to_string(),
                attendee_email: "budi@example.com".to_string(),
                attendee_phone: "0813".to_string(),
                custom_field_responses: Some(r#"{"T-shirt size":"L"}"#.to_string()),
                status: TicketStatus::Active,
                check_in_at: None,
                created_at: now,
                updated_at: now,
            },
            event: Event {
                id: 2,
                title: "Jazz Night".to_string(),
                venue: "Main Hall".to_string(),
                city: "Jakarta".to_string(),
                event_date: now,
                status: EventStatus::Published,
                fee_percentage: Decimal::new(5, 0),
                created_at: now,
                updated_at: now,
            },
            ticket_type_name: "VIP".to_string(),
        };
        let email = ticket_email(&order(), &issued);
        assert_eq!(email.to, "budi@example.com");
        assert_eq!(email.subject, "Your e-ticket for Jazz Night - #ORD-1-ABC123");
        assert!(email.html.contains("T-1-3-0"));
        assert!(email.html.contains("T-shirt size:</strong> L"));
    }

    #[test]
    fn test_custom_field_lines_accepts_both_shapes() {
        assert_eq!(
            custom_field_lines(Some(r#"[{"label":"Size","value":"M"},{"key":"Age","value":30}]"#)),
            vec![
                ("Size".to_string(), "M".to_string()),
                ("Age".to_string(), "30".to_string())
            ]
        );
        assert!(custom_field_lines(Some("null")).is_empty());
        assert!(custom_field_lines(Some("not json")).is_empty());
        assert!(custom_field_lines(None).is_empty());
    }

    #[test]
    fn test_cancellation_email_carries_reason() {
        let email = cancellation_email(&order(), "Cancelled by admin");
        assert_eq!(email.subject, "Order cancelled - ORD-1-ABC123");
        assert!(email.html.contains("Cancelled by admin"));
    }
}
