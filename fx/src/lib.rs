//! BudgetShare FX
//!
//! Exchange-rate fetching, caching and base-currency conversion. Every amount
//! in BudgetShare is stored in one base currency; this crate turns user
//! amounts into base amounts and back.
//!
//! # Features
//!
//! - HTTP rate provider tolerating the keyed and legacy upstream shapes
//! - Single-slot rate cache with TTL and stale read-through
//! - Static fallback table so rate resolution never fails
//! - Pure conversion math over immutable snapshots
//!
//! # Example
//!
//! ```rust,ignore
//! use budgetshare_fx::{FxConfig, FxService};
//! use budgetshare_common::Currency;
//!
//! let service = FxService::from_config(&FxConfig::from_env())?;
//!
//! // Store an expense paid in dollars
//! let php = service.convert_to_base(25.0, &Currency::usd()).await?;
//!
//! // Show a balance in euros
//! let eur = service.convert_from_base(php, &Currency::eur()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod fallback;
pub mod provider;
pub mod service;
pub mod snapshot;

pub use cache::{CacheStats, RateCache, RateCacheConfig};
pub use config::FxConfig;
pub use conversion::{ConversionQuote, ConversionRequest};
pub use error::{FxError, FxResult, ProviderError};
pub use fallback::fallback_snapshot;
pub use provider::{ExchangeRateApiProvider, RateProvider};
pub use service::{Freshness, FxService, ResolvedRates};
pub use snapshot::{RateOrigin, RateSnapshot};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::StaticRateProvider;
