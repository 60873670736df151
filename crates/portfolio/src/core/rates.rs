use rust_decimal::{Decimal, MathematicalOps};
use tracing::debug;

use crate::constants::SECONDS_PER_YEAR;
use crate::types::wad_ray::Ray;

/// RAY-encoded annual rate → percent (`raw / 1e27 * 100`).
///
/// Exact on the integer; malformed input returns `0`.
pub fn ray_rate_to_apy_percent(raw: &str) -> Decimal {
    match Ray::parse(raw) {
        Some(rate) => rate.to_apr_percent(),
        None => {
            debug!(raw, "unparseable ray rate, using 0");
            Decimal::ZERO
        }
    }
}

/// Per-second compounded APY, percent, from a RAY-encoded APR:
/// `((1 + r / 31_536_000) ^ 31_536_000 - 1) * 100`.
///
/// Malformed input and overflow return `0`.
pub fn compounded_apy_percent(raw: &str) -> Decimal {
    let Some(rate) = Ray::parse(raw) else {
        debug!(raw, "unparseable ray rate, using 0");
        return Decimal::ZERO;
    };
    let per_second = rate.to_decimal() / Decimal::from(SECONDS_PER_YEAR);
    (Decimal::ONE + per_second)
        .checked_powu(SECONDS_PER_YEAR)
        .and_then(|growth| (growth - Decimal::ONE).checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or_else(|| {
            debug!(raw, "compounded APY overflow, using 0");
            Decimal::ZERO
        })
}

/// Relative change from `previous` to `current`, percent. `0` when
/// `previous` is zero or the change is out of range.
pub fn percentage_change(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ZERO;
    }
    current
        .checked_sub(previous)
        .and_then(|delta| delta.checked_div(previous))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or_default()
}
