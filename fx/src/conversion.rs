//! Base-currency conversion math.
//!
//! Every rate in a [`RateSnapshot`] is units of that currency per one unit of
//! base. Reaching base divides by the source rate; leaving base multiplies by
//! the target rate. Inverting either step corrupts every stored balance.

use budgetshare_common::{Currency, Timestamp};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::{FxError, FxResult};
use crate::snapshot::RateSnapshot;

/// Decimal places for quoted amounts.
pub const AMOUNT_DECIMAL_PLACES: u32 = 2;
/// Decimal places for quoted rates.
pub const RATE_DECIMAL_PLACES: u32 = 6;

fn lookup(snapshot: &RateSnapshot, currency: &Currency) -> FxResult<f64> {
    snapshot
        .rate(currency)
        .ok_or_else(|| FxError::UnsupportedCurrency(currency.clone()))
}

/// Convert `amount` from one currency to another through the base currency.
pub fn convert(
    amount: f64,
    from: &Currency,
    to: &Currency,
    snapshot: &RateSnapshot,
) -> FxResult<f64> {
    if from == to {
        return Ok(amount);
    }
    if amount == 0.0 {
        return Ok(0.0);
    }

    let base = snapshot.base();

    let amount_in_base = if from == base {
        amount
    } else {
        amount / lookup(snapshot, from)?
    };

    if to == base {
        Ok(amount_in_base)
    } else {
        Ok(amount_in_base * lookup(snapshot, to)?)
    }
}

/// Units of `to` per one unit of `from`.
pub fn get_rate(from: &Currency, to: &Currency, snapshot: &RateSnapshot) -> FxResult<f64> {
    if from == to {
        return Ok(1.0);
    }

    let base = snapshot.base();

    let from_to_base = if from == base {
        1.0
    } else {
        1.0 / lookup(snapshot, from)?
    };

    if to == base {
        Ok(from_to_base)
    } else {
        Ok(from_to_base * lookup(snapshot, to)?)
    }
}

/// Convert into the snapshot's base currency for storage.
pub fn convert_to_base(amount: f64, currency: &Currency, snapshot: &RateSnapshot) -> FxResult<f64> {
    convert(amount, currency, snapshot.base(), snapshot)
}

/// Convert a stored base amount into a display currency.
pub fn convert_from_base(
    amount_in_base: f64,
    currency: &Currency,
    snapshot: &RateSnapshot,
) -> FxResult<f64> {
    convert(amount_in_base, snapshot.base(), currency, snapshot)
}

/// Sorted currency codes the snapshot can convert, base included.
pub fn supported_currencies(snapshot: &RateSnapshot) -> Vec<Currency> {
    // BTreeMap keys are ordered and the base entry is always present.
    snapshot.rates().keys().cloned().collect()
}

/// Request to convert an amount.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub amount: f64,
    pub from: Currency,
    pub to: Currency,
}

impl ConversionRequest {
    pub fn new(amount: f64, from: impl Into<Currency>, to: impl Into<Currency>) -> Self {
        Self {
            amount,
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Result of a conversion, rounded for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionQuote {
    pub original_amount: f64,
    pub from_currency: Currency,
    pub to_currency: Currency,
    /// Rounded to [`AMOUNT_DECIMAL_PLACES`].
    pub converted_amount: Decimal,
    /// Rounded to [`RATE_DECIMAL_PLACES`].
    pub rate: Decimal,
    pub exact_amount: f64,
    pub exact_rate: f64,
    pub rate_date: Option<String>,
    pub rates_fetched_at: Timestamp,
}

impl ConversionQuote {
    /// Rounded amount as a float.
    pub fn converted_amount_f64(&self) -> f64 {
        self.converted_amount.to_f64().unwrap_or(self.exact_amount)
    }
}

/// Round half away from zero and fix the scale, so `16` renders as `16.00`.
fn round(value: f64, places: u32) -> FxResult<Decimal> {
    let mut rounded = Decimal::from_f64(value)
        .ok_or(FxError::InvalidAmount(value))?
        .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(places);
    Ok(rounded)
}

/// Convert and produce a display quote.
pub fn quote(request: &ConversionRequest, snapshot: &RateSnapshot) -> FxResult<ConversionQuote> {
    if !request.amount.is_finite() {
        return Err(FxError::InvalidAmount(request.amount));
    }

    let exact_amount = convert(request.amount, &request.from, &request.to, snapshot)?;
    let exact_rate = get_rate(&request.from, &request.to, snapshot)?;

    Ok(ConversionQuote {
        original_amount: request.amount,
        from_currency: request.from.clone(),
        to_currency: request.to.clone(),
        converted_amount: round(exact_amount, AMOUNT_DECIMAL_PLACES)?,
        rate: round(exact_rate, RATE_DECIMAL_PLACES)?,
        exact_amount,
        exact_rate,
        rate_date: snapshot.source_date().map(str::to_string),
        rates_fetched_at: snapshot.fetched_at(),
    })
}
