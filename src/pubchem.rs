//! PubChem REST collaborator: URL templates and batch entry points
//!
//! Response bodies are handed back as text or JSON; interpreting PubChem's
//! record layout is left to the caller.

use crate::batch::{BatchOptions, BatchResult, BatchRunner, FieldRecord, ResultOrder};
use crate::fetch::{FetchRequest, FieldExtractor, JsonExtractor, TextExtractor};
use reqwest::Url;
use std::sync::Arc;
use thiserror::Error;

/// Properties requested by [`PubChem::cids_to_records`]
pub const STRUCTURE_PROPERTIES: &[&str] = &["CanonicalSMILES", "InChI", "InChIKey"];

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBase { url: String, reason: String },
}

/// URL builder rooted at the REST base (e.g. `https://pubchem.ncbi.nlm.nih.gov/rest`)
#[derive(Debug, Clone)]
pub struct PubChemUrls {
    base: Url,
}

impl PubChemUrls {
    pub fn new(base: &str) -> Result<Self, UrlError> {
        let invalid = |reason: String| UrlError::InvalidBase {
            url: base.to_string(),
            reason,
        };
        let base = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("URL cannot be a base".to_string()));
        }
        Ok(Self { base })
    }

    fn with_segments(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }

    /// `pug/compound/smiles/{smiles}/cids/TXT`
    pub fn smiles_to_cids(&self, smiles: &str) -> String {
        self.with_segments(&["pug", "compound", "smiles", smiles, "cids", "TXT"])
    }

    /// `pug/compound/cid/{cids}/property/{properties}/JSON`
    pub fn cid_properties(&self, cids: &[u64], properties: &[&str]) -> String {
        let cids: Vec<String> = cids.iter().map(u64::to_string).collect();
        self.with_segments(&[
            "pug",
            "compound",
            "cid",
            &cids.join(","),
            "property",
            &properties.join(","),
            "JSON",
        ])
    }

    /// `pug_view/data/compound/{cid}/JSON/`
    pub fn compound_view(&self, cid: u64) -> String {
        self.with_segments(&["pug_view", "data", "compound", &cid.to_string(), "JSON", ""])
    }
}

/// The three lookups, driven through a shared batch runner
#[derive(Clone)]
pub struct PubChem {
    runner: BatchRunner,
    urls: PubChemUrls,
    chunk_size: usize,
}

impl PubChem {
    pub fn new(runner: BatchRunner, urls: PubChemUrls, chunk_size: usize) -> Self {
        Self {
            runner,
            urls,
            chunk_size,
        }
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    /// One request per SMILES, results paired with their input in input order
    ///
    /// The payload is the trimmed TXT body, one CID per line.
    pub async fn smiles_to_cids(&self, smiles: Vec<String>) -> BatchResult<String, String> {
        let runner = self.runner.with_options(BatchOptions {
            order: ResultOrder::Input,
            ..self.runner.options().clone()
        });
        runner
            .run(
                smiles,
                |s| FetchRequest::new(self.urls.smiles_to_cids(s)),
                Arc::new(TextExtractor::trimmed()),
            )
            .await
    }

    /// Structure properties for many CIDs, requested in chunks
    ///
    /// Result order follows the runner's configured [`ResultOrder`].
    /// `failed_ids()` on the result lists every CID of every failed chunk.
    pub async fn cids_to_records(
        &self,
        cids: Vec<u64>,
    ) -> BatchResult<Vec<u64>, serde_json::Value> {
        self.runner
            .run_chunked(
                cids,
                self.chunk_size,
                |group| FetchRequest::new(self.urls.cid_properties(group, STRUCTURE_PROPERTIES)),
                Arc::new(JsonExtractor::<serde_json::Value>::new()),
            )
            .await
    }

    /// Per-CID property lookup over the compound view documents
    ///
    /// Every record lists every requested field, empty when the compound
    /// could not be fetched or the field was not found.
    pub async fn cid_properties<X>(
        &self,
        cids: Vec<u64>,
        fields: &[String],
        extractor: Arc<X>,
    ) -> Vec<FieldRecord<u64>>
    where
        X: FieldExtractor + 'static,
    {
        self.runner
            .run_fields(
                cids,
                fields,
                |cid| FetchRequest::new(self.urls.compound_view(*cid)),
                extractor,
            )
            .await
    }
}
