//! FX error types.

use budgetshare_common::Currency;
use thiserror::Error;

/// Errors surfaced to consumers of the FX service.
///
/// Provider failures are absorbed by rate resolution and only appear here
/// when a provider is called directly.
#[derive(Debug, Error)]
pub enum FxError {
    /// Currency is absent from the resolved rate table.
    #[error("Currency {0} not supported")]
    UnsupportedCurrency(Currency),

    /// Amount is NaN or infinite.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// Upstream fetch failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Configuration rejected by validation.
    #[error("Invalid FX configuration: {0}")]
    InvalidConfig(String),
}

impl FxError {
    /// Whether the error was caused by caller input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FxError::UnsupportedCurrency(_) | FxError::InvalidAmount(_)
        )
    }
}

/// Upstream rate fetch failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request exceeded the timeout budget.
    #[error("Rate request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// Transport-level failure (connect, TLS, body read).
    #[error("Rate request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response.
    #[error("Rate API {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    /// Body was not valid JSON.
    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    /// Body parsed but carried neither `rates` nor `conversion_rates`.
    #[error("Response from {endpoint} has no rates field")]
    MissingRates { endpoint: String },

    /// Rates field held nothing usable besides the base currency.
    #[error("Response from {endpoint} has no usable rates")]
    NoUsableRates { endpoint: String },

    /// Upstream reported an error in the payload.
    #[error("Rate API {endpoint} reported error: {error_type}")]
    Upstream { endpoint: String, error_type: String },

    /// Every configured endpoint failed; holds the individual failures.
    #[error("All {} rate endpoints failed", .0.len())]
    AllEndpointsFailed(Vec<ProviderError>),

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
