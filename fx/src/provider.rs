//! Rate provider traits and implementations.

use async_trait::async_trait;
use budgetshare_common::{Clock, Currency, SystemClock, Timestamp};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FxConfig;
use crate::error::ProviderError;
use crate::snapshot::{RateOrigin, RateSnapshot};

/// Source of live exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch every rate relative to the configured base currency.
    async fn fetch_rates(&self) -> Result<RateSnapshot, ProviderError>;
}

/// Which upstream response shape an endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Credential-gated, answers with `conversion_rates`.
    Keyed,
    /// Keyless, answers with `rates`.
    Legacy,
}

#[derive(Debug, Clone)]
struct Endpoint {
    kind: EndpointKind,
    url: String,
    /// `url` with the credential masked, safe for logs and errors.
    display: String,
}

/// Both upstream shapes in one body type.
#[derive(Debug, Deserialize)]
struct RatesBody {
    #[serde(default)]
    result: Option<String>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
    #[serde(default, alias = "base_code")]
    base: Option<String>,
    #[serde(default)]
    rates: Option<HashMap<String, f64>>,
    #[serde(default)]
    conversion_rates: Option<HashMap<String, f64>>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time_last_update_utc: Option<String>,
}

/// Normalize a raw response body into a snapshot.
pub(crate) fn parse_rates_body(
    body: &[u8],
    base: &Currency,
    endpoint: &str,
    provider: &str,
    fetched_at: Timestamp,
) -> Result<RateSnapshot, ProviderError> {
    let parsed: RatesBody =
        serde_json::from_slice(body).map_err(|e| ProviderError::Malformed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

    if parsed.result.as_deref() == Some("error") {
        return Err(ProviderError::Upstream {
            endpoint: endpoint.to_string(),
            error_type: parsed.error_type.unwrap_or_else(|| "unknown".to_string()),
        });
    }

    if let Some(quoted) = parsed.base.as_deref() {
        if Currency::new(quoted) != *base {
            return Err(ProviderError::Malformed {
                endpoint: endpoint.to_string(),
                reason: format!("rates quoted against {}, expected {}", quoted.trim(), base),
            });
        }
    }

    let rates = parsed
        .rates
        .or(parsed.conversion_rates)
        .ok_or_else(|| ProviderError::MissingRates {
            endpoint: endpoint.to_string(),
        })?;

    let snapshot = RateSnapshot::new(
        base.clone(),
        rates,
        fetched_at,
        parsed.date.or(parsed.time_last_update_utc),
        RateOrigin::Live {
            provider: provider.to_string(),
        },
    );

    // Only the base entry survived normalization.
    if snapshot.len() <= 1 {
        return Err(ProviderError::NoUsableRates {
            endpoint: endpoint.to_string(),
        });
    }

    Ok(snapshot)
}

/// HTTP provider for the exchangerate-api service.
///
/// Tries the keyed endpoint first when a credential is configured, then the
/// legacy keyless endpoint. The first success wins. The request timeout
/// bounds the whole fetch, not each attempt.
pub struct ExchangeRateApiProvider {
    client: reqwest::Client,
    base: Currency,
    timeout: Duration,
    endpoints: Vec<Endpoint>,
    clock: Arc<dyn Clock>,
}

impl ExchangeRateApiProvider {
    pub const NAME: &'static str = "exchangerate-api";

    /// Create a provider from configuration.
    pub fn new(config: &FxConfig) -> Result<Self, ProviderError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a provider stamping snapshots with `clock`.
    pub fn with_clock(config: &FxConfig, clock: Arc<dyn Clock>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("budgetshare-fx/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        let base = config.base_currency.clone();
        let mut endpoints = Vec::with_capacity(2);

        match &config.api_key {
            Some(key) => {
                let root = config.api_url.trim_end_matches('/');
                endpoints.push(Endpoint {
                    kind: EndpointKind::Keyed,
                    url: format!("{}/{}/latest/{}", root, key, base),
                    display: format!("{}/***/latest/{}", root, base),
                });
            }
            None => {
                warn!("No exchange rate API key configured, using legacy endpoint only");
            }
        }

        let legacy = format!(
            "{}/latest/{}",
            config.legacy_api_url.trim_end_matches('/'),
            base
        );
        endpoints.push(Endpoint {
            kind: EndpointKind::Legacy,
            url: legacy.clone(),
            display: legacy,
        });

        Ok(Self {
            client,
            base,
            timeout: config.request_timeout,
            endpoints,
            clock,
        })
    }

    /// Endpoint kinds in the order they are tried.
    pub fn endpoint_kinds(&self) -> Vec<EndpointKind> {
        self.endpoints.iter().map(|e| e.kind).collect()
    }

    /// Log-safe endpoint URLs in the order they are tried.
    pub fn endpoint_urls(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.display.as_str()).collect()
    }

    async fn fetch_from(&self, endpoint: &Endpoint) -> Result<RateSnapshot, ProviderError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    endpoint: endpoint.display.clone(),
                }
            } else {
                // Strip the URL so the credential never reaches an error message.
                ProviderError::Http {
                    endpoint: endpoint.display.clone(),
                    source: e.without_url(),
                }
            }
        };

        debug!(endpoint = %endpoint.display, kind = ?endpoint.kind, "Fetching rates");

        let response = self
            .client
            .get(&endpoint.url)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint: endpoint.display.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify)?;

        parse_rates_body(
            &body,
            &self.base,
            &endpoint.display,
            Self::NAME,
            self.clock.now(),
        )
    }

    async fn fetch_in_order(&self) -> Result<RateSnapshot, ProviderError> {
        let mut failures = Vec::new();

        for endpoint in &self.endpoints {
            match self.fetch_from(endpoint).await {
                Ok(snapshot) => {
                    info!(
                        endpoint = %endpoint.display,
                        currencies = snapshot.len(),
                        date = snapshot.source_date().unwrap_or("-"),
                        "Currency rates updated"
                    );
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(
                        endpoint = %endpoint.display,
                        error = %e,
                        "Rate endpoint failed"
                    );
                    failures.push(e);
                }
            }
        }

        if failures.len() == 1 {
            if let Some(only) = failures.pop() {
                return Err(only);
            }
        }
        Err(ProviderError::AllEndpointsFailed(failures))
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_rates(&self) -> Result<RateSnapshot, ProviderError> {
        match tokio::time::timeout(self.timeout, self.fetch_in_order()).await {
            Ok(result) => result,
            Err(_) => {
                let endpoints = self.endpoint_urls().join(", ");
                warn!(
                    endpoints = %endpoints,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Rate fetch exceeded timeout"
                );
                Err(ProviderError::Timeout { endpoint: endpoints })
            }
        }
    }
}

/// Provider returning a fixed snapshot or a fixed failure, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct StaticRateProvider {
    name: String,
    snapshot: parking_lot::Mutex<Option<RateSnapshot>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticRateProvider {
    /// Provider that always returns `snapshot`.
    pub fn succeeding(snapshot: RateSnapshot) -> Self {
        Self {
            name: "static".to_string(),
            snapshot: parking_lot::Mutex::new(Some(snapshot)),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Provider that always fails.
    pub fn failing() -> Self {
        Self {
            name: "static".to_string(),
            snapshot: parking_lot::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Swap the response; `None` makes subsequent fetches fail.
    pub fn set_snapshot(&self, snapshot: Option<RateSnapshot>) {
        *self.snapshot.lock() = snapshot;
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for StaticRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> Result<RateSnapshot, ProviderError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.snapshot
            .lock()
            .clone()
            .ok_or_else(|| ProviderError::Status {
                endpoint: self.name.clone(),
                status: 503,
            })
    }
}
