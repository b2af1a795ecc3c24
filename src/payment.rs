//! Payment-channel artifacts attached to a new order.
//!
//! The selector string from checkout decides the channel. Virtual accounts,
//! e-wallet links and retail codes are generated locally until a gateway is
//! wired in; manual transfers carry the receiving account and instructions
//! quoting the exact fingerprinted total.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::PaymentConfig;
use crate::utils::money::format_rupiah;

const GUEST_ACCOUNT_ID: i64 = 99_999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentChannel {
    VirtualAccount { bank_code: &'static str },
    EWallet,
    RetailOutlet,
    ManualTransfer,
    Other,
}

impl PaymentChannel {
    pub fn classify(method: &str) -> Self {
        // Checked first: bank names inside manual-transfer selectors may
        // contain the markers below.
        if is_manual_transfer(method) {
            return PaymentChannel::ManualTransfer;
        }
        if method.contains("VA") {
            let bank_code = if method.contains("BCA") {
                "70012"
            } else if method.contains("Mandiri") {
                "88888"
            } else if method.contains("BNI") {
                "88881"
            } else if method.contains("BRI") {
                "88882"
            } else {
                "88888"
            };
            return PaymentChannel::VirtualAccount { bank_code };
        }
        if ["QRIS", "OVO", "Dana"].iter().any(|m| method.contains(m)) {
            return PaymentChannel::EWallet;
        }
        if method.contains("Alfamart") || method.contains("Indomaret") {
            return PaymentChannel::RetailOutlet;
        }
        PaymentChannel::Other
    }

    /// Channels where the payer controls the transferred amount and the
    /// order needs a fingerprint code.
    pub fn needs_fingerprint(&self) -> bool {
        matches!(self, PaymentChannel::ManualTransfer)
    }
}

pub fn is_manual_transfer(method: &str) -> bool {
    method.starts_with("BANK_TRANSFER_") || method == "MANUAL_JAGO"
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentArtifacts {
    pub virtual_account_number: Option<String>,
    pub payment_url: Option<String>,
    pub payment_instructions: Option<String>,
    pub payment_data: Option<String>,
}

pub fn prepare(
    config: &PaymentConfig,
    channel: &PaymentChannel,
    order_number: &str,
    user_id: Option<i64>,
    total_amount: Decimal,
    now: DateTime<Utc>,
) -> PaymentArtifacts {
    match channel {
        PaymentChannel::VirtualAccount { bank_code } => {
            let account = user_id.unwrap_or(GUEST_ACCOUNT_ID);
            let stamp = now.timestamp().rem_euclid(1_000_000);
            PaymentArtifacts {
                virtual_account_number: Some(format!("{bank_code}{account:05}{stamp:06}")),
                ..PaymentArtifacts::default()
            }
        }
        PaymentChannel::EWallet => PaymentArtifacts {
            payment_url: Some(format!(
                "{}/{}",
                config.payment_page_base_url.trim_end_matches('/'),
                order_number
            )),
            ..PaymentArtifacts::default()
        },
        PaymentChannel::RetailOutlet => {
            let code = now
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .rem_euclid(100_000_000);
            PaymentArtifacts {
                virtual_account_number: Some(format!("ALFA-{code:08}")),
                ..PaymentArtifacts::default()
            }
        }
        PaymentChannel::ManualTransfer => PaymentArtifacts {
            virtual_account_number: Some(config.account_number.clone()),
            payment_data: Some(config.account_name.clone()),
            payment_instructions: Some(format!(
                "Please transfer to {} account {} ({}). Send the exact amount including the \
                 last three digits ({}) so the payment can be verified automatically.",
                config.bank_name,
                config.account_number,
                config.account_name,
                format_rupiah(total_amount)
            )),
            ..PaymentArtifacts::default()
        },
        PaymentChannel::Other => PaymentArtifacts::default(),
    }
}
