//! Fetch engine: one GET through rotating proxies with bounded retry
//!
//! Each attempt acquires a proxy, issues the request through the batch
//! [`Session`] and classifies the result as an [`AttemptOutcome`]. The
//! [`Fetcher`] loop retries retryable outcomes until a 200 is extracted or
//! the attempt budget is spent, and always returns a [`FetchOutcome`].

mod extract;
mod fetcher;
pub mod http;
mod outcome;

#[cfg(test)]
pub(crate) mod testing;

pub use extract::{ExtractionError, Extractor, FieldExtractor, JsonExtractor, TextExtractor};
pub use fetcher::{Fetcher, RetryPolicy};
pub use http::{
    Connector, FetchRequest, HttpConfig, HttpConnector, HttpSession, RawResponse, Session,
    TransportError,
};
pub use outcome::{
    AttemptOutcome, ExhaustionPolicy, FetchError, FetchOutcome, STATUS_EXTRACTION_FAILED,
    STATUS_NOT_ATTEMPTED, STATUS_OK, STATUS_TRANSPORT_FAILED,
};
