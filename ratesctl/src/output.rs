//! Text and JSON rendering for command output.

use std::fmt::Write;

use budgetshare_common::Currency;
use budgetshare_fx::{ConversionQuote, ResolvedRates};
use serde::Serialize;

#[derive(Serialize)]
struct SupportedView<'a> {
    currencies: &'a [Currency],
}

pub fn rates_json(rates: &ResolvedRates) -> serde_json::Result<String> {
    serde_json::to_string_pretty(rates)
}

pub fn quote_json(quote: &ConversionQuote) -> serde_json::Result<String> {
    serde_json::to_string_pretty(quote)
}

pub fn supported_json(currencies: &[Currency]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&SupportedView { currencies })
}

pub fn rates_text(rates: &ResolvedRates) -> String {
    let snapshot = &rates.snapshot;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Base {} | {} | date {} | fetched {}",
        snapshot.base(),
        rates.freshness,
        snapshot.source_date().unwrap_or("-"),
        snapshot.fetched_at().to_rfc3339()
    );
    for (currency, rate) in snapshot.rates() {
        let _ = writeln!(out, "{:<4} {}", currency, rate);
    }

    out
}

pub fn quote_text(quote: &ConversionQuote) -> String {
    format!(
        "{} {} = {} {} (rate {})\n",
        quote.original_amount,
        quote.from_currency,
        quote.converted_amount,
        quote.to_currency,
        quote.rate
    )
}

pub fn supported_text(currencies: &[Currency]) -> String {
    let codes: Vec<&str> = currencies.iter().map(Currency::code).collect();
    format!("{}\n", codes.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetshare_fx::conversion::quote;
    use budgetshare_fx::{ConversionRequest, Freshness, RateOrigin, RateSnapshot};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn resolved() -> ResolvedRates {
        ResolvedRates {
            snapshot: Arc::new(RateSnapshot::new(
                Currency::php(),
                [("USD", 0.018), ("EUR", 0.016)],
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Some("2024-01-01".into()),
                RateOrigin::Fallback,
            )),
            freshness: Freshness::Fallback,
        }
    }

    #[test]
    fn test_rates_text() {
        let text = rates_text(&resolved());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Base PHP | fallback | date 2024-01-01 | fetched 2024-01-01T00:00:00+00:00"
        );
        assert_eq!(lines[1..], ["EUR  0.016", "PHP  1", "USD  0.018"]);
    }

    #[test]
    fn test_rates_json() {
        let json: serde_json::Value =
            serde_json::from_str(&rates_json(&resolved()).unwrap()).unwrap();

        assert_eq!(json["baseCurrency"], "PHP");
        assert_eq!(json["freshness"], "fallback");
        assert_eq!(json["rates"]["EUR"], 0.016);
    }

    #[test]
    fn test_quote_text() {
        let rates = resolved();
        let q = quote(&ConversionRequest::new(1000.0, "PHP", "EUR"), &rates.snapshot).unwrap();

        assert_eq!(quote_text(&q), "1000 PHP = 16.00 EUR (rate 0.016000)\n");
    }

    #[test]
    fn test_supported() {
        let currencies = vec![Currency::eur(), Currency::php()];

        assert_eq!(supported_text(&currencies), "EUR PHP\n");
        let json: serde_json::Value =
            serde_json::from_str(&supported_json(&currencies).unwrap()).unwrap();
        assert_eq!(json["currencies"], serde_json::json!(["EUR", "PHP"]));
    }
}
