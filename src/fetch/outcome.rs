use super::extract::ExtractionError;
use super::http::TransportError;
use crate::proxy::ProxyHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code for outcomes that never reached a server
pub const STATUS_NOT_ATTEMPTED: i32 = -1;
/// Status code for transport and proxy failures
pub const STATUS_TRANSPORT_FAILED: i32 = 0;
/// Status code for a 200 response whose body could not be extracted
pub const STATUS_EXTRACTION_FAILED: i32 = -2;
pub const STATUS_OK: i32 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no available proxy")]
    NoProxyAvailable,

    #[error("transport failure via proxy {proxy}: {source}")]
    Transport {
        proxy: ProxyHandle,
        #[source]
        source: TransportError,
    },

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("batch timed out before the fetch completed")]
    BatchTimedOut,

    #[error("batch cancelled before the fetch completed")]
    Cancelled,

    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    pub fn status_code(&self) -> i32 {
        match self {
            FetchError::Transport { .. } => STATUS_TRANSPORT_FAILED,
            FetchError::HttpStatus(status) => i32::from(*status),
            FetchError::Extraction(_) => STATUS_EXTRACTION_FAILED,
            FetchError::NoProxyAvailable
            | FetchError::BatchTimedOut
            | FetchError::Cancelled
            | FetchError::Aborted(_) => STATUS_NOT_ATTEMPTED,
        }
    }

    /// How much a retained failure tells the caller about the remote side
    fn specificity(&self) -> u8 {
        match self {
            FetchError::HttpStatus(_) => 3,
            FetchError::Transport { .. } => 2,
            FetchError::NoProxyAvailable => 1,
            _ => 0,
        }
    }
}

/// Result of a single attempt, inspected by the retry loop
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    /// Worth another attempt with a fresh proxy
    Retryable(FetchError),
    /// Retrying would not help
    Fatal(FetchError),
}

/// Which failure an exhausted fetch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// The final attempt's failure, whatever it was
    #[default]
    Last,
    /// HTTP status over transport failure over missing proxy; newest on ties
    MostSpecific,
}

impl ExhaustionPolicy {
    /// Pick which of two failures to keep
    pub fn retain(self, previous: FetchError, latest: FetchError) -> FetchError {
        match self {
            ExhaustionPolicy::Last => latest,
            ExhaustionPolicy::MostSpecific => {
                if previous.specificity() > latest.specificity() {
                    previous
                } else {
                    latest
                }
            }
        }
    }
}

/// Terminal result of a fetch, after all retries
///
/// `status_code == 200` exactly when `payload` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub method: &'static str,
    pub url: String,
    pub status_code: i32,
    pub payload: Option<T>,
    pub error: Option<FetchError>,
    pub attempts: u32,
}

impl<T> FetchOutcome<T> {
    pub fn success(url: impl Into<String>, payload: T, attempts: u32) -> Self {
        Self {
            method: "GET",
            url: url.into(),
            status_code: STATUS_OK,
            payload: Some(payload),
            error: None,
            attempts,
        }
    }

    pub fn failure(url: impl Into<String>, error: FetchError, attempts: u32) -> Self {
        Self {
            method: "GET",
            url: url.into(),
            status_code: error.status_code(),
            payload: None,
            error: Some(error),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.payload.is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}
