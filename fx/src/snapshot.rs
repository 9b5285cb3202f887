//! Rate snapshots.

use budgetshare_common::{Currency, Timestamp};
use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Where a snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateOrigin {
    /// Fetched from an upstream provider.
    Live { provider: String },
    /// Static approximate table.
    Fallback,
}

/// One fetched or fallback set of exchange rates.
///
/// Each rate is units of that currency per one unit of `base`. The table
/// always holds `base -> 1.0` and only finite, positive rates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    #[serde(rename = "baseCurrency")]
    base: Currency,
    rates: BTreeMap<Currency, f64>,
    #[serde(rename = "timestamp")]
    fetched_at: Timestamp,
    #[serde(rename = "date")]
    source_date: Option<String>,
    origin: RateOrigin,
}

impl RateSnapshot {
    /// Build a snapshot, normalizing the table.
    pub fn new<K, I>(
        base: Currency,
        rates: I,
        fetched_at: Timestamp,
        source_date: Option<String>,
        origin: RateOrigin,
    ) -> Self
    where
        K: Into<Currency>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut table = BTreeMap::new();
        let mut dropped = 0usize;

        for (code, rate) in rates {
            if rate.is_finite() && rate > 0.0 {
                table.insert(code.into(), rate);
            } else {
                dropped += 1;
            }
        }
        table.insert(base.clone(), 1.0);

        if dropped > 0 {
            debug!(base = %base, dropped, "Dropped unusable rates from snapshot");
        }

        Self {
            base,
            rates: table,
            fetched_at,
            source_date,
            origin,
        }
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn rates(&self) -> &BTreeMap<Currency, f64> {
        &self.rates
    }

    /// Units of `currency` per one unit of base, if known.
    pub fn rate(&self, currency: &Currency) -> Option<f64> {
        if currency == &self.base {
            return Some(1.0);
        }
        self.rates.get(currency).copied()
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.rate(currency).is_some()
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn source_date(&self) -> Option<&str> {
        self.source_date.as_deref()
    }

    pub fn origin(&self) -> &RateOrigin {
        &self.origin
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == RateOrigin::Fallback
    }

    /// Time elapsed since the snapshot was fetched.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.fetched_at)
    }

    /// Number of currencies in the table, base included.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
