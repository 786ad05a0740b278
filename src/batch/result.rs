use crate::fetch::FetchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order in which a batch reports its results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrder {
    /// Same order as the submitted items
    #[default]
    Input,
    /// Order in which fetches finished
    Completion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Success<W, T> {
    pub item: W,
    pub payload: T,
}

/// Work item that never produced a payload, kept so it can be re-driven
#[derive(Debug, Clone, PartialEq)]
pub struct Failure<W> {
    pub item: W,
    pub status_code: i32,
    pub error: Option<FetchError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<W, T> {
    pub succeeded: Vec<Success<W, T>>,
    pub failed: Vec<Failure<W>>,
}

impl<W, T> BatchResult<W, T> {
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payloads(&self) -> impl Iterator<Item = &T> {
        self.succeeded.iter().map(|s| &s.payload)
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &W> {
        self.failed.iter().map(|f| &f.item)
    }
}

impl<I: Clone, T> BatchResult<Vec<I>, T> {
    /// Identifiers of every failed chunk, flattened
    pub fn failed_ids(&self) -> Vec<I> {
        self.failed
            .iter()
            .flat_map(|f| f.item.iter().cloned())
            .collect()
    }
}

/// Per-item record of requested fields
///
/// Every requested field is present; fields that could not be fetched or
/// extracted hold an empty list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRecord<W> {
    pub item: W,
    pub fields: BTreeMap<String, Vec<String>>,
    pub status_code: i32,
    #[serde(skip)]
    pub error: Option<FetchError>,
}

impl<W> FieldRecord<W> {
    pub fn empty(item: W, fields: &[String], status_code: i32, error: Option<FetchError>) -> Self {
        Self {
            item,
            fields: fields.iter().map(|f| (f.clone(), Vec::new())).collect(),
            status_code,
            error,
        }
    }
}
