//! Static approximate rates used when no live or cached data exists.

use budgetshare_common::{Clock, Currency};
use tracing::warn;

use crate::snapshot::{RateOrigin, RateSnapshot};

/// Currency the static table is quoted against.
pub const FALLBACK_BASE: &str = "PHP";

/// Units of each currency per one PHP.
pub const FALLBACK_RATES: &[(&str, f64)] = &[
    ("PHP", 1.0),
    ("USD", 0.018),
    ("EUR", 0.016),
    ("GBP", 0.014),
    ("JPY", 2.65),
    ("AUD", 0.027),
    ("CAD", 0.024),
    ("CNY", 0.13),
];

/// Build the fallback snapshot for `base`.
///
/// The table is rebased when `base` is not PHP. A base missing from the table
/// yields a snapshot holding only the base itself.
pub fn fallback_snapshot(base: &Currency, clock: &dyn Clock) -> RateSnapshot {
    let now = clock.now();
    let rebase = FALLBACK_RATES
        .iter()
        .find(|(code, _)| *code == base.code())
        .map(|(_, rate)| *rate);

    let rates: Vec<(&str, f64)> = match rebase {
        Some(divisor) => FALLBACK_RATES
            .iter()
            .map(|(code, rate)| (*code, rate / divisor))
            .collect(),
        None => {
            warn!(
                base = %base,
                fallback_base = FALLBACK_BASE,
                "Base currency missing from fallback table, only identity rate available"
            );
            Vec::new()
        }
    };

    RateSnapshot::new(
        base.clone(),
        rates,
        now,
        Some(now.format("%Y-%m-%d").to_string()),
        RateOrigin::Fallback,
    )
}
