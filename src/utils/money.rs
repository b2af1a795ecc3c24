//! Rupiah formatting and parsing.
//!
//! Amounts are whole rupiah in practice; the fractional part is dropped when
//! rendering, and the thousands separator is a dot (`Rp 50.412`).

use rust_decimal::Decimal;

/// Renders the integral part of `amount` with dot thousands separators.
pub fn format_price(amount: Decimal) -> String {
    let digits = amount.trunc().abs().normalize().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount.is_sign_negative() && !amount.trunc().is_zero() {
        out.push('-');
    }
    let len = digits.len();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

pub fn format_rupiah(amount: Decimal) -> String {
    format!("Rp {}", format_price(amount))
}

/// Parses a dotted rupiah figure such as `50.412` into `50412`.
pub fn parse_rupiah_digits(raw: &str) -> Option<Decimal> {
    let digits: String = raw.chars().filter(|c| *c != '.').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<Decimal>().ok()
}
