use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Request was considered invalid due to error: {0}")]
    InvalidRequest(#[from] anyhow::Error),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Forecast request {0} was superseded by a newer request")]
    Superseded(u64),
}

/// A non-physical or inconsistent input that makes a forecast impossible to compute.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("Invalid configuration for `{field}`: {reason}")]
pub struct ConfigurationError {
    field: &'static str,
    reason: String,
}

impl ConfigurationError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// The name of the offending input field, as it appears in the JSON input.
    pub fn field(&self) -> &'static str {
        self.field
    }

    pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() && value > 0. {
            Ok(())
        } else {
            Err(Self::new(field, format!("must be greater than zero, got {value}")))
        }
    }

    pub(crate) fn require_non_negative(field: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() && value >= 0. {
            Ok(())
        } else {
            Err(Self::new(field, format!("must not be negative, got {value}")))
        }
    }
}

/// Failure of an external data provider. These are always recovered by a fallback chain.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{provider} is unavailable: {reason}")]
    Unavailable {
        provider: &'static str,
        reason: String,
    },
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
    #[error("HTTP error from {provider}: {error}")]
    Http {
        provider: &'static str,
        #[source]
        error: reqwest::Error,
    },
    #[error("Could not parse response from {provider}: {reason}")]
    Parse {
        provider: &'static str,
        reason: String,
    },
    #[error("{provider} has no data for {key}")]
    NotFound { provider: &'static str, key: String },
}

impl SourceError {
    /// Wrap a request error without its URL, whose query string may hold an API key.
    pub(crate) fn http(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |error| Self::Http {
            provider,
            error: error.without_url(),
        }
    }

    pub(crate) fn parse(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            provider,
            reason: reason.into(),
        }
    }
}
