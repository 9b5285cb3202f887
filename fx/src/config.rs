//! FX service configuration.

use budgetshare_common::{constants, Currency, DurationExt};
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::cache::RateCacheConfig;
use crate::error::{FxError, FxResult};

pub const ENV_BASE_CURRENCY: &str = "FX_BASE_CURRENCY";
pub const ENV_API_KEY: &str = "EXCHANGE_RATE_API_KEY";
pub const ENV_API_URL: &str = "FX_API_URL";
pub const ENV_LEGACY_API_URL: &str = "FX_LEGACY_API_URL";
pub const ENV_CACHE_TTL_SECS: &str = "FX_CACHE_TTL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "FX_REQUEST_TIMEOUT_SECS";

/// Main FX configuration.
#[derive(Clone)]
pub struct FxConfig {
    /// Currency every amount is stored in.
    pub base_currency: Currency,
    /// Credential for the keyed endpoint.
    pub api_key: Option<String>,
    /// Keyed endpoint root; the key and `/latest/{BASE}` are appended.
    pub api_url: String,
    /// Keyless endpoint root; `/latest/{BASE}` is appended.
    pub legacy_api_url: String,
    /// Lifetime of a cached snapshot.
    pub cache_ttl: Duration,
    /// Budget for one upstream request.
    pub request_timeout: Duration,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::php(),
            api_key: None,
            api_url: "https://v6.exchangerate-api.com/v6".to_string(),
            legacy_api_url: "https://api.exchangerate-api.com/v4".to_string(),
            cache_ttl: constants::rate_cache_ttl().as_std(),
            request_timeout: constants::rate_request_timeout().as_std(),
        }
    }
}

impl fmt::Debug for FxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FxConfig")
            .field("base_currency", &self.base_currency)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_url", &self.api_url)
            .field("legacy_api_url", &self.legacy_api_url)
            .field("cache_ttl", &self.cache_ttl)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup(ENV_BASE_CURRENCY) {
            config.base_currency = Currency::new(base);
        }

        config.api_key = lookup(ENV_API_KEY)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            config.api_url = url;
        }

        if let Some(url) = lookup(ENV_LEGACY_API_URL) {
            config.legacy_api_url = url;
        }

        if let Some(secs) = parse_secs(&lookup, ENV_CACHE_TTL_SECS) {
            config.cache_ttl = secs;
        }

        if let Some(secs) = parse_secs(&lookup, ENV_REQUEST_TIMEOUT_SECS) {
            config.request_timeout = secs;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.base_currency.code().parse::<Currency>().is_err() {
            return Err(FxError::InvalidConfig(format!(
                "base currency {:?} is not a three-letter code",
                self.base_currency.code()
            )));
        }

        if self.api_url.trim().is_empty() || self.legacy_api_url.trim().is_empty() {
            return Err(FxError::InvalidConfig("rate API URLs cannot be empty".into()));
        }

        if self.cache_ttl.is_zero() {
            return Err(FxError::InvalidConfig("cache TTL cannot be 0".into()));
        }

        if self.request_timeout.is_zero() {
            return Err(FxError::InvalidConfig("request timeout cannot be 0".into()));
        }

        Ok(())
    }

    /// Cache settings derived from this configuration.
    pub fn cache_config(&self) -> RateCacheConfig {
        RateCacheConfig {
            ttl: chrono::Duration::from_std(self.cache_ttl)
                .unwrap_or_else(|_| constants::rate_cache_ttl()),
        }
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable duration");
            None
        }
    }
}
