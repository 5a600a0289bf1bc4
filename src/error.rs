//! Error types for exchange-rate operations.

use thiserror::Error;

/// Errors that can occur while computing or looking up exchange rates.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The requested currency is absent from the upstream feed.
    #[error("Currency {0} not found")]
    CurrencyNotFound(String),

    /// The requested base currency is absent from the upstream feed.
    #[error("Base currency {0} not found")]
    BaseCurrencyNotFound(String),

    /// The upstream feed could not be reached or answered non-2xx.
    #[error("Exchange rate feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The feed answered with a payload that does not parse as the
    /// expected currency listing.
    #[error("Malformed feed payload: {0}")]
    FeedFormat(String),

    /// The durable rate store failed.
    #[error("Storage error: {0}")]
    Store(#[from] tokio_rusqlite::Error),
}

impl ExchangeError {
    /// Whether the error was caused by the caller's input rather than a
    /// backend failure. Drives the HTTP status mapping in the route layer.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::CurrencyNotFound(_) | Self::BaseCurrencyNotFound(_)
        )
    }
}
