//! Pluggable payload extraction from successful responses

use super::http::RawResponse;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Failed to decode response body: {0}")]
    Decode(String),

    #[error("Missing expected content: {0}")]
    Missing(String),

    #[error("Invalid content: {0}")]
    Invalid(String),
}

/// Turns a raw 200 response into the caller's payload
pub trait Extractor: Send + Sync {
    type Output: Send + 'static;

    fn extract(&self, response: &RawResponse) -> Result<Self::Output, ExtractionError>;
}

/// Decodes the body as UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor {
    trim: bool,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self { trim: false }
    }

    /// Strip surrounding whitespace, e.g. the trailing newline of TXT outputs
    pub fn trimmed() -> Self {
        Self { trim: true }
    }
}

impl Extractor for TextExtractor {
    type Output = String;

    fn extract(&self, response: &RawResponse) -> Result<String, ExtractionError> {
        let text = std::str::from_utf8(&response.body)
            .map_err(|e| ExtractionError::Decode(e.to_string()))?;
        let text = if self.trim { text.trim() } else { text };
        Ok(text.to_string())
    }
}

/// Decodes the body as JSON into `T`
pub struct JsonExtractor<T = serde_json::Value> {
    _output: PhantomData<fn() -> T>,
}

impl<T> JsonExtractor<T> {
    pub fn new() -> Self {
        Self {
            _output: PhantomData,
        }
    }
}

impl<T> Default for JsonExtractor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Extractor for JsonExtractor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn extract(&self, response: &RawResponse) -> Result<T, ExtractionError> {
        serde_json::from_slice(&response.body).map_err(|e| ExtractionError::Decode(e.to_string()))
    }
}

/// Keyed extraction for per-item property lookups
///
/// The document is parsed once per response, then every requested field is
/// pulled out of it.
pub trait FieldExtractor: Send + Sync {
    type Document;

    fn parse(&self, response: &RawResponse) -> Result<Self::Document, ExtractionError>;

    fn extract_field(
        &self,
        document: &Self::Document,
        field: &str,
    ) -> Result<Vec<String>, ExtractionError>;
}
