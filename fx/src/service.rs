//! Rate resolution and the consumer-facing conversion API.

use std::fmt;
use std::sync::Arc;

use budgetshare_common::{Clock, Currency, SystemClock};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, RateCache};
use crate::config::FxConfig;
use crate::conversion::{self, ConversionQuote, ConversionRequest};
use crate::error::FxResult;
use crate::fallback::fallback_snapshot;
use crate::provider::{ExchangeRateApiProvider, RateProvider};
use crate::snapshot::RateSnapshot;

/// How current the resolved rates are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Just fetched from the provider.
    Fresh,
    /// Served from cache within its TTL.
    Cached,
    /// Expired cache entry used because the provider failed.
    Stale,
    /// Static table used because nothing else was available.
    Fallback,
}

impl Freshness {
    /// Whether the rates came from a degraded path.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Freshness::Stale | Freshness::Fallback)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Freshness::Fresh => "fresh",
            Freshness::Cached => "cached",
            Freshness::Stale => "stale",
            Freshness::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// Rates picked by resolution together with how they were obtained.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRates {
    #[serde(flatten)]
    pub snapshot: Arc<RateSnapshot>,
    pub freshness: Freshness,
}

/// Exchange-rate service.
///
/// Constructed once at startup and shared (typically as `Arc<FxService>`).
/// Every operation resolves rates first: cache, then provider, then the stale
/// cache entry, then the static fallback table. Resolution never fails; only
/// an unsupported currency is reported to the caller.
pub struct FxService {
    provider: Arc<dyn RateProvider>,
    cache: RateCache,
    base: Currency,
    clock: Arc<dyn Clock>,
}

impl FxService {
    /// Create a new service with the given provider.
    pub fn new(provider: Arc<dyn RateProvider>, config: &FxConfig) -> Self {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    /// Create a service reading time from `clock`.
    pub fn with_clock(
        provider: Arc<dyn RateProvider>,
        config: &FxConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            cache: RateCache::with_clock(config.cache_config(), clock.clone()),
            base: config.base_currency.clone(),
            clock,
        }
    }

    /// Create a service backed by the HTTP provider.
    pub fn from_config(config: &FxConfig) -> FxResult<Self> {
        config.validate()?;
        let provider = ExchangeRateApiProvider::new(config)?;

        info!(
            base = %config.base_currency,
            endpoints = ?provider.endpoint_urls(),
            ttl_secs = config.cache_ttl.as_secs(),
            "FX service configured"
        );

        Ok(Self::new(Arc::new(provider), config))
    }

    /// Currency every stored amount is expressed in.
    pub fn base_currency(&self) -> &Currency {
        &self.base
    }

    /// Resolve the current rate table.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn get_rates(&self) -> ResolvedRates {
        if let Some(snapshot) = self.cache.get() {
            debug!("Using cached rates");
            return ResolvedRates {
                snapshot,
                freshness: Freshness::Cached,
            };
        }

        match self.provider.fetch_rates().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.cache.set(snapshot.clone());
                ResolvedRates {
                    snapshot,
                    freshness: Freshness::Fresh,
                }
            }
            Err(e) => {
                if let Some(stale) = self.cache.get_stale_if_any() {
                    warn!(
                        error = %e,
                        fetched_at = %stale.fetched_at(),
                        "Rate provider failed, using stale cached rates"
                    );
                    return ResolvedRates {
                        snapshot: stale,
                        freshness: Freshness::Stale,
                    };
                }

                warn!(error = %e, "Rate provider failed and cache is empty, using fallback rates");
                ResolvedRates {
                    snapshot: Arc::new(fallback_snapshot(&self.base, self.clock.as_ref())),
                    freshness: Freshness::Fallback,
                }
            }
        }
    }

    /// Convert an amount between two currencies.
    #[instrument(skip(self))]
    pub async fn convert(&self, amount: f64, from: &Currency, to: &Currency) -> FxResult<f64> {
        if from == to {
            return Ok(amount);
        }
        if amount == 0.0 {
            return Ok(0.0);
        }
        let rates = self.get_rates().await;
        conversion::convert(amount, from, to, &rates.snapshot)
    }

    /// Convert an amount into the base currency for storage.
    pub async fn convert_to_base(&self, amount: f64, currency: &Currency) -> FxResult<f64> {
        self.convert(amount, currency, &self.base).await
    }

    /// Convert a stored base amount into a display currency.
    pub async fn convert_from_base(&self, amount_in_base: f64, currency: &Currency) -> FxResult<f64> {
        self.convert(amount_in_base, &self.base, currency).await
    }

    /// Units of `to` per one unit of `from`.
    #[instrument(skip(self))]
    pub async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<f64> {
        if from == to {
            return Ok(1.0);
        }
        let rates = self.get_rates().await;
        conversion::get_rate(from, to, &rates.snapshot)
    }

    /// Currencies the current rate table can convert, sorted.
    pub async fn supported_currencies(&self) -> Vec<Currency> {
        let rates = self.get_rates().await;
        conversion::supported_currencies(&rates.snapshot)
    }

    /// Convert and produce a rounded quote, both from one resolved table.
    #[instrument(skip(self, request), fields(from = %request.from, to = %request.to))]
    pub async fn quote(&self, request: &ConversionRequest) -> FxResult<ConversionQuote> {
        let rates = self.get_rates().await;
        let quote = conversion::quote(request, &rates.snapshot)?;

        debug!(
            amount = quote.original_amount,
            converted = %quote.converted_amount,
            rate = %quote.rate,
            freshness = %rates.freshness,
            "Conversion quoted"
        );

        Ok(quote)
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FxError;
    use crate::provider::stub::{self, Reply};
    use crate::provider::StaticRateProvider;
    use crate::snapshot::RateOrigin;
    use budgetshare_common::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn live_snapshot(usd: f64, clock: &ManualClock) -> RateSnapshot {
        RateSnapshot::new(
            Currency::php(),
            [("USD", usd), ("EUR", 0.016)],
            clock.now(),
            Some("2024-01-01".into()),
            RateOrigin::Live {
                provider: "static".into(),
            },
        )
    }

    fn setup(provider: StaticRateProvider) -> (FxService, Arc<StaticRateProvider>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let provider = Arc::new(provider);
        let service = FxService::with_clock(provider.clone(), &FxConfig::default(), clock.clone());
        (service, provider, clock)
    }

    fn clock_at_epoch() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_fresh_then_cached() {
        let (service, provider, _) = setup(StaticRateProvider::succeeding(live_snapshot(
            0.018,
            &clock_at_epoch(),
        )));

        let first = service.get_rates().await;
        assert_eq!(first.freshness, Freshness::Fresh);

        let second = service.get_rates().await;
        assert_eq!(second.freshness, Freshness::Cached);
        assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let (service, provider, clock) = setup(StaticRateProvider::succeeding(live_snapshot(
            0.018,
            &clock_at_epoch(),
        )));

        service.get_rates().await;
        clock.advance(Duration::seconds(3601));
        provider.set_snapshot(Some(live_snapshot(0.02, &clock)));

        let rates = service.get_rates().await;
        assert_eq!(rates.freshness, Freshness::Fresh);
        assert_eq!(rates.snapshot.rate(&Currency::usd()), Some(0.02));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_fallback_when_provider_fails_and_cache_empty() {
        let (service, _, _) = setup(StaticRateProvider::failing());

        let rates = service.get_rates().await;

        assert_eq!(rates.freshness, Freshness::Fallback);
        assert!(rates.freshness.is_degraded());
        assert!(rates.snapshot.is_fallback());
        assert_eq!(rates.snapshot.rate(&Currency::gbp()), Some(0.014));
    }

    #[tokio::test]
    async fn test_fallback_is_never_cached() {
        let (service, provider, clock) = setup(StaticRateProvider::failing());

        service.get_rates().await;
        provider.set_snapshot(Some(live_snapshot(0.018, &clock)));

        let rates = service.get_rates().await;
        assert_eq!(rates.freshness, Freshness::Fresh);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_cache_preferred_over_fallback() {
        let (service, provider, clock) = setup(StaticRateProvider::succeeding(live_snapshot(
            0.0175,
            &clock_at_epoch(),
        )));

        service.get_rates().await;
        clock.advance(Duration::hours(5));
        provider.set_snapshot(None);

        let rates = service.get_rates().await;

        assert_eq!(rates.freshness, Freshness::Stale);
        assert!(!rates.snapshot.is_fallback());
        assert_eq!(rates.snapshot.rate(&Currency::usd()), Some(0.0175));
    }

    #[tokio::test]
    async fn test_convert_scenario() {
        let (service, _, _) = setup(StaticRateProvider::succeeding(live_snapshot(
            0.018,
            &clock_at_epoch(),
        )));

        let php = service
            .convert_to_base(100.0, &Currency::usd())
            .await
            .unwrap();
        assert!((php - 5555.555_555).abs() < 1e-3);

        let eur = service
            .convert_from_base(1000.0, &Currency::eur())
            .await
            .unwrap();
        assert!((eur - 16.0).abs() < 1e-9);

        let cross = service
            .convert(50.0, &Currency::usd(), &Currency::eur())
            .await
            .unwrap();
        assert!((cross - 44.444_444).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_identity_and_zero_skip_resolution() {
        let (service, provider, _) = setup(StaticRateProvider::failing());
        let xyz = Currency::new("XYZ");

        assert_eq!(service.convert(42.5, &xyz, &xyz).await.unwrap(), 42.5);
        assert_eq!(service.get_rate(&xyz, &xyz).await.unwrap(), 1.0);
        assert_eq!(
            service.convert(0.0, &Currency::usd(), &Currency::eur()).await.unwrap(),
            0.0
        );
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_currency_surfaces() {
        let (service, _, _) = setup(StaticRateProvider::failing());

        let err = service
            .convert(10.0, &Currency::new("XYZ"), &Currency::php())
            .await
            .unwrap_err();

        assert!(matches!(err, FxError::UnsupportedCurrency(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_get_rate_and_supported() {
        let (service, _, _) = setup(StaticRateProvider::succeeding(live_snapshot(
            0.018,
            &clock_at_epoch(),
        )));

        assert_eq!(
            service.get_rate(&Currency::php(), &Currency::usd()).await.unwrap(),
            0.018
        );
        assert_eq!(
            service.supported_currencies().await,
            vec![Currency::eur(), Currency::php(), Currency::usd()]
        );
    }

    #[tokio::test]
    async fn test_quote() {
        let (service, _, _) = setup(StaticRateProvider::succeeding(live_snapshot(
            0.018,
            &clock_at_epoch(),
        )));

        let quote = service
            .quote(&ConversionRequest::new(50.0, "USD", "EUR"))
            .await
            .unwrap();

        assert_eq!(quote.converted_amount.to_string(), "44.44");
        assert_eq!(quote.rate_date.as_deref(), Some("2024-01-01"));
    }

    #[tokio::test]
    async fn test_concurrent_resolution() {
        let (service, _, _) = setup(StaticRateProvider::succeeding(live_snapshot(
            0.018,
            &clock_at_epoch(),
        )));
        let service = Arc::new(service);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .convert_to_base(1.8, &Currency::usd())
                        .await
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            let php = handle.await.unwrap();
            assert!((php - 100.0).abs() < 1e-9);
        }
    }

    fn http_config(root: &str) -> FxConfig {
        FxConfig {
            legacy_api_url: format!("{}/v4", root),
            request_timeout: std::time::Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_upstream_rates_use_fallback() {
        let root = stub::spawn(|_| {
            Reply::Json(
                200,
                r#"{"base":"PHP","date":"2024-05-01","rates":{}}"#.to_string(),
            )
        })
        .await;
        let service = FxService::from_config(&http_config(&root)).unwrap();

        let rates = service.get_rates().await;
        assert_eq!(rates.freshness, Freshness::Fallback);

        let php = service
            .convert(100.0, &Currency::usd(), &Currency::php())
            .await
            .unwrap();
        assert!((php - 5555.555_555).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_empty_upstream_rates_keep_stale_snapshot() {
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();
        let root = stub::spawn(move |_| {
            let body = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                r#"{"base":"PHP","date":"2024-05-01","rates":{"PHP":1,"USD":0.0175}}"#
            } else {
                r#"{"base":"PHP","date":"2024-05-02","rates":{}}"#
            };
            Reply::Json(200, body.to_string())
        })
        .await;

        let config = http_config(&root);
        let clock = Arc::new(clock_at_epoch());
        let provider = ExchangeRateApiProvider::with_clock(&config, clock.clone()).unwrap();
        let service = FxService::with_clock(Arc::new(provider), &config, clock.clone());

        assert_eq!(service.get_rates().await.freshness, Freshness::Fresh);
        clock.advance(Duration::seconds(3600));

        let rates = service.get_rates().await;
        assert_eq!(rates.freshness, Freshness::Stale);
        assert_eq!(rates.snapshot.rate(&Currency::usd()), Some(0.0175));
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = FxConfig {
            cache_ttl: std::time::Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            FxService::from_config(&config),
            Err(FxError::InvalidConfig(_))
        ));
    }
}
