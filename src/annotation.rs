//! Source dispatch and result assembly.
//!
//! Each requested source is answered by one [`MatchProducer`]. Local
//! producers run on the calling thread; remote ones each get a scoped thread
//! so a slow job never holds up the others. A producer that fails or panics
//! contributes an empty list.

use crate::{
    annotation_match::Match,
    cdd::CddClient,
    composition::CompositionClassifier,
    config::AnnotatorConfig,
    error::AnnotationError,
    interpro::InterProScanClient,
    job::CancellationToken,
    motif_library::MotifLibrary,
    motif_search::MotifSearch,
    protein_sequence::ProteinSequence,
    uniprot::UniProtClient,
};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use std::{fmt, sync::Arc, thread};
use tracing::{debug, error, warn};

/// Annotation sources in canonical result order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    PatternMotifs,
    DomainFamilies,
    CompositionDomains,
    UniprotFeatures,
    ConservedDomains,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::PatternMotifs,
        Source::DomainFamilies,
        Source::CompositionDomains,
        Source::UniprotFeatures,
        Source::ConservedDomains,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Source::PatternMotifs => "pattern_motifs",
            Source::DomainFamilies => "domain_families",
            Source::CompositionDomains => "composition_domains",
            Source::UniprotFeatures => "uniprot_features",
            Source::ConservedDomains => "conserved_domains",
        }
    }

    /// Case-insensitive, surrounding whitespace ignored.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves requested names to distinct sources in canonical order.
pub fn parse_sources<I, S>(names: I) -> Vec<Source>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sources: Vec<Source> = names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref();
            let source = Source::parse(name);
            if source.is_none() {
                debug!(name, "ignoring unknown source");
            }
            source
        })
        .collect();
    sources.sort();
    sources.dedup();
    sources
}

/// Produces the matches of one source.
pub trait MatchProducer: Send + Sync {
    fn source(&self) -> Source;

    fn produce(
        &self,
        sequence: &ProteinSequence,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>, AnnotationError>;

    /// Remote producers may block on the network and run on their own thread.
    fn is_remote(&self) -> bool {
        false
    }
}

/// Per-source matches, keyed in canonical source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationResult {
    entries: Vec<(Source, Vec<Match>)>,
}

impl AnnotationResult {
    pub fn get(&self, source: Source) -> Option<&[Match]> {
        self.entries
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, m)| m.as_slice())
    }

    pub fn sources(&self) -> impl Iterator<Item = Source> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Source, &[Match])> {
        self.entries.iter().map(|(s, m)| (*s, m.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_matches(&self) -> usize {
        self.entries.iter().map(|(_, m)| m.len()).sum()
    }
}

impl Serialize for AnnotationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (source, matches) in &self.entries {
            map.serialize_entry(source.name(), matches)?;
        }
        map.end()
    }
}

pub struct Annotator {
    library: Arc<MotifLibrary>,
    producers: Vec<Box<dyn MatchProducer>>,
}

impl Annotator {
    /// An annotator with the two local sources registered.
    pub fn new(library: Arc<MotifLibrary>) -> Self {
        let producers: Vec<Box<dyn MatchProducer>> = vec![
            Box::new(MotifSearch::new(library.clone())) as Box<dyn MatchProducer>,
            Box::new(CompositionClassifier),
        ];
        Self { library, producers }
    }

    /// Registers `producer`, replacing any producer for the same source.
    pub fn with_producer(mut self, producer: Box<dyn MatchProducer>) -> Self {
        let source = producer.source();
        self.producers.retain(|p| p.source() != source);
        self.producers.push(producer);
        self
    }

    /// All five sources, with the remote ones talking HTTP.
    pub fn from_config(config: &AnnotatorConfig) -> Result<Self, AnnotationError> {
        let library = Arc::new(MotifLibrary::load(config.motif_library_path.as_deref())?);
        if !config.has_contact_email() {
            warn!("no contact e-mail configured; InterProScan submissions will be rejected");
        }
        Ok(Self::new(library)
            .with_producer(Box::new(InterProScanClient::from_config(config)?))
            .with_producer(Box::new(UniProtClient::from_config(config)?))
            .with_producer(Box::new(CddClient::from_config(config)?)))
    }

    pub fn library(&self) -> &MotifLibrary {
        &self.library
    }

    pub fn registered_sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.producers.iter().map(|p| p.source()).collect();
        sources.sort();
        sources
    }

    fn producer(&self, source: Source) -> Option<&dyn MatchProducer> {
        self.producers
            .iter()
            .find(|p| p.source() == source)
            .map(|p| p.as_ref())
    }

    pub fn annotate<I, S>(&self, sequence: &ProteinSequence, sources: I) -> AnnotationResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.annotate_with_cancel(sequence, sources, &CancellationToken::new())
    }

    /// Like [`Annotator::annotate`]; remote jobs are abandoned at their next
    /// poll once `cancel` is set.
    pub fn annotate_with_cancel<I, S>(
        &self,
        sequence: &ProteinSequence,
        sources: I,
        cancel: &CancellationToken,
    ) -> AnnotationResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run_sources(sequence, sources, cancel).0
    }

    /// Like [`Annotator::annotate`], but a configuration or sequence error
    /// raised by any producer is returned instead of becoming an empty list.
    pub fn try_annotate<I, S>(
        &self,
        sequence: &ProteinSequence,
        sources: I,
    ) -> Result<AnnotationResult, AnnotationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.run_sources(sequence, sources, &CancellationToken::new()) {
            (_, Some(fatal)) => Err(fatal),
            (result, None) => Ok(result),
        }
    }

    /// Returns the assembled result and the first caller-visible error, if any.
    fn run_sources<I, S>(
        &self,
        sequence: &ProteinSequence,
        sources: I,
        cancel: &CancellationToken,
    ) -> (AnnotationResult, Option<AnnotationError>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted = parse_sources(sources);
        let mut entries: Vec<(Source, Vec<Match>)> = Vec::with_capacity(wanted.len());
        let mut fatal: Vec<(Source, AnnotationError)> = Vec::new();

        thread::scope(|scope| {
            let mut remote = Vec::new();
            for &source in &wanted {
                let Some(producer) = self.producer(source) else {
                    debug!(%source, "no producer registered");
                    entries.push((source, Vec::new()));
                    continue;
                };
                if producer.is_remote() {
                    let handle = scope.spawn(move || producer.produce(sequence, cancel));
                    remote.push((source, handle));
                } else {
                    let outcome = producer.produce(sequence, cancel);
                    entries.push((source, recover(source, outcome, &mut fatal)));
                }
            }
            for (source, handle) in remote {
                let matches = match handle.join() {
                    Ok(outcome) => recover(source, outcome, &mut fatal),
                    Err(_) => {
                        warn!(%source, "producer panicked");
                        Vec::new()
                    }
                };
                entries.push((source, matches));
            }
        });

        entries.sort_by_key(|(source, _)| *source);
        fatal.sort_by_key(|(source, _)| *source);
        (
            AnnotationResult { entries },
            fatal.into_iter().next().map(|(_, e)| e),
        )
    }
}

/// Turns a producer outcome into its match list. Caller-visible errors are
/// logged and kept in `fatal`.
fn recover(
    source: Source,
    outcome: Result<Vec<Match>, AnnotationError>,
    fatal: &mut Vec<(Source, AnnotationError)>,
) -> Vec<Match> {
    match outcome {
        Ok(matches) => {
            debug!(%source, count = matches.len(), "source answered");
            matches
        }
        Err(AnnotationError::Cancelled) => {
            debug!(%source, "source abandoned");
            Vec::new()
        }
        Err(e) if e.is_caller_visible() => {
            error!(%source, error = %e, "source rejected the request");
            fatal.push((source, e));
            Vec::new()
        }
        Err(e) => {
            warn!(%source, error = %e, "source failed; reporting no matches");
            Vec::new()
        }
    }
}
