//! Payment fingerprint allocation for manual bank transfers.
//!
//! The payer types the amount themselves, so the last three digits carry a
//! code that tells concurrently pending orders for the same base amount
//! apart. The inbound-mail scanner later matches on the full total.

use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::store::StoreTx;
use crate::utils::error::AppError;

pub const MIN_CODE: i32 = 101;
pub const MAX_CODE: i32 = 999;
/// Number of distinct codes in `MIN_CODE..=MAX_CODE`.
pub const CAPACITY: usize = (MAX_CODE - MIN_CODE + 1) as usize;

/// Lowest code in range that is not in `used`.
pub fn first_free_code(used: &BTreeSet<i32>) -> Option<i32> {
    (MIN_CODE..=MAX_CODE).find(|code| !used.contains(code))
}

/// Codes already taken for `base_amount`: for every pending total, the
/// offset from the base when it is a whole number in range. Totals are what
/// the payer transfers, so an order fingerprinted from a neighbouring base
/// still blocks the code that would reproduce its total.
pub fn occupied_codes(base_amount: Decimal, totals: &[Decimal]) -> BTreeSet<i32> {
    totals
        .iter()
        .map(|total| *total - base_amount)
        .filter(|offset| offset.fract().is_zero())
        .filter_map(|offset| offset.to_i32())
        .filter(|code| (MIN_CODE..=MAX_CODE).contains(code))
        .collect()
}

/// Picks the code for a new order whose pre-code total is `base_amount`.
///
/// Takes the per-amount bucket lock first, so the scan and the order insert
/// that follows in the same transaction cannot interleave with another
/// checkout for the same amount.
pub async fn allocate(tx: &mut dyn StoreTx, base_amount: Decimal) -> Result<i32, AppError> {
    tx.lock_amount_bucket(base_amount).await?;

    let low = base_amount + Decimal::from(MIN_CODE);
    let high = base_amount + Decimal::from(MAX_CODE);
    let totals = tx.pending_fingerprinted_totals(low, high).await?;
    let used = occupied_codes(base_amount, &totals);

    if used.len() >= CAPACITY {
        warn!(%base_amount, pending = used.len(), "Fingerprint codes exhausted");
        return Err(AppError::PaymentCapacityExhausted);
    }

    let code = first_free_code(&used).ok_or(AppError::PaymentCapacityExhausted)?;
    debug!(%base_amount, code, "Allocated fingerprint code");
    Ok(code)
}
