//! UniProtKB feature lookup for the `uniprot_features` source.
//!
//! Reviewed entries of similar length are fetched in one search, and their
//! annotated domain-like features become matches. Positions come from the
//! reference entry, not from an alignment against the query.

use crate::{
    annotation::{MatchProducer, Source},
    annotation_match::{Match, normalize_locations},
    config::{AnnotatorConfig, UniProtConfig},
    error::AnnotationError,
    http::{build_client, describe_send_error, success_text},
    job::CancellationToken,
    protein_sequence::ProteinSequence,
};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MAX_FEATURE_MATCHES: usize = 5;
pub const SEARCH_FIELDS: &str = "accession,id,protein_name,ft_domain,ft_motif,ft_region,ft_site";
const FEATURE_TYPES: [&str; 4] = ["Domain", "Motif", "Region", "Site"];
const FEATURE_KEYWORDS: [&str; 5] = ["kinase", "binding", "finger", "domain", "motif"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub size: String,
}

impl SearchRequest {
    /// Reviewed entries whose length is within `window` of `sequence_len`.
    pub fn similar_length(sequence_len: usize, window: usize, size: usize) -> Self {
        Self {
            query: format!(
                "(sequence_length:[{} TO {}]) AND (reviewed:true)",
                sequence_len.saturating_sub(window),
                sequence_len + window
            ),
            size: size.to_string(),
        }
    }

    pub fn params(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("query", self.query.as_str()),
            ("format", "json"),
            ("size", self.size.as_str()),
            ("fields", SEARCH_FIELDS),
        ]
    }
}

pub trait FeatureTransport: Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<String, AnnotationError>;
}

pub struct HttpFeatureTransport {
    url: String,
    client: Client,
}

impl HttpFeatureTransport {
    pub fn new(config: &UniProtConfig) -> Result<Self, AnnotationError> {
        Ok(Self {
            url: config.search_url.clone(),
            client: build_client(Duration::from_secs(config.request_timeout_secs))?,
        })
    }
}

impl FeatureTransport for HttpFeatureTransport {
    fn search(&self, request: &SearchRequest) -> Result<String, AnnotationError> {
        let response = self
            .client
            .get(&self.url)
            .query(&request.params())
            .send()
            .map_err(|e| {
                AnnotationError::TransientNetwork(describe_send_error("UniProt search", &e))
            })?;
        success_text(response, "UniProt search").map_err(AnnotationError::TransientNetwork)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    #[serde(default)]
    primary_accession: Option<String>,
    #[serde(default)]
    protein_description: Option<ProteinDescription>,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProteinDescription {
    #[serde(default)]
    recommended_name: Option<RecommendedName>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedName {
    #[serde(default)]
    full_name: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default, rename = "type")]
    feature_type: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<FeatureLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureLocation {
    #[serde(default)]
    start: Option<Position>,
    #[serde(default)]
    end: Option<Position>,
}

#[derive(Debug, Deserialize)]
struct Position {
    #[serde(default)]
    value: Option<usize>,
}

impl Entry {
    fn protein_name(&self) -> &str {
        self.protein_description
            .as_ref()
            .and_then(|d| d.recommended_name.as_ref())
            .and_then(|n| n.full_name.as_ref())
            .map(|v| v.value.as_str())
            .unwrap_or("Unknown protein")
    }
}

fn is_domain_like(description: &str) -> bool {
    if description.contains("PS") {
        return true;
    }
    let lower = description.to_lowercase();
    FEATURE_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn feature_match(entry: &Entry, feature: &Feature, sequence_len: usize) -> Option<Match> {
    if !FEATURE_TYPES.contains(&feature.feature_type.as_str()) {
        return None;
    }
    let description = feature.description.as_deref().unwrap_or("Unknown feature");
    if !is_domain_like(description) {
        return None;
    }
    let location = feature.location.as_ref();
    let start = location
        .and_then(|l| l.start.as_ref())
        .and_then(|p| p.value)
        .unwrap_or(1);
    let end = location
        .and_then(|l| l.end.as_ref())
        .and_then(|p| p.value)
        .unwrap_or(sequence_len);
    let accession = entry.primary_accession.as_deref().unwrap_or("Unknown");
    Some(
        Match::new(
            format!("UniProt_{accession}"),
            &feature.feature_type,
            description,
            format!("Domain/motif found in {}", entry.protein_name()),
            normalize_locations([(start, end)], sequence_len),
        )
        .with_source_protein(accession),
    )
}

/// Turns a UniProtKB search payload into at most [`MAX_FEATURE_MATCHES`]
/// matches, looking at the first `entries_considered` entries.
pub fn parse_uniprot_features(
    payload: &str,
    sequence_len: usize,
    entries_considered: usize,
) -> Result<Vec<Match>, AnnotationError> {
    let root: Value = serde_json::from_str(payload)?;
    let Some(results) = root.get("results").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    debug!(entries = results.len(), "UniProt entries returned");
    let mut matches = Vec::new();
    for raw in results.iter().take(entries_considered) {
        let entry = match Entry::deserialize(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping malformed UniProt entry");
                continue;
            }
        };
        for feature in &entry.features {
            if let Some(m) = feature_match(&entry, feature, sequence_len) {
                matches.push(m);
                if matches.len() == MAX_FEATURE_MATCHES {
                    return Ok(matches);
                }
            }
        }
    }
    Ok(matches)
}

pub struct UniProtClient {
    transport: Box<dyn FeatureTransport>,
    config: UniProtConfig,
}

impl UniProtClient {
    pub fn new(transport: Box<dyn FeatureTransport>, config: &UniProtConfig) -> Self {
        Self {
            transport,
            config: config.clone(),
        }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Result<Self, AnnotationError> {
        let transport = HttpFeatureTransport::new(&config.uniprot)?;
        Ok(Self::new(Box::new(transport), &config.uniprot))
    }

    pub fn search(&self, sequence: &ProteinSequence) -> Result<Vec<Match>, AnnotationError> {
        let request = SearchRequest::similar_length(
            sequence.len(),
            self.config.length_window,
            self.config.page_size,
        );
        info!(query = %request.query, "searching UniProt");
        let payload = self.transport.search(&request)?;
        parse_uniprot_features(&payload, sequence.len(), self.config.entries_considered)
    }
}

impl MatchProducer for UniProtClient {
    fn source(&self) -> Source {
        Source::UniprotFeatures
    }

    fn produce(
        &self,
        sequence: &ProteinSequence,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>, AnnotationError> {
        if cancel.is_cancelled() {
            return Err(AnnotationError::Cancelled);
        }
        self.search(sequence)
    }

    fn is_remote(&self) -> bool {
        true
    }
}
