//! NCBI CD-Search client for the `conserved_domains` source.
//!
//! The finished report is scraped for domain accessions; this is best-effort
//! and confined to [`parse_cdd_results`].

use crate::{
    annotation::{MatchProducer, Source},
    annotation_match::{Match, Span},
    config::{AnnotatorConfig, CddConfig},
    error::AnnotationError,
    http::{build_client, describe_send_error, success_text},
    job::{
        CancellationToken, Clock, ExternalJob, JobPoller, PollOutcome, PollSchedule, SystemClock,
    },
    protein_sequence::ProteinSequence,
};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::blocking::Client;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

pub const MAX_CONSERVED_DOMAIN_MATCHES: usize = 5;
const CD_BITSCORE: f64 = 45.0;
const PFAM_BITSCORE: f64 = 40.0;

lazy_static! {
    static ref SEARCH_ID_PATTERNS: Vec<Regex> = [
        r"(?i)CDSID\s*=\s*(\w+)",
        r#"(?i)cdsid["']?\s*[:=]\s*["']?(\w+)["']?"#,
        r#"(?i)searchid["']?\s*[:=]\s*["']?(\w+)["']?"#,
        // tab-separated header of the plain-text reply
        r"(?im)^#cdsid\s+([\w-]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("search id regex"))
    .collect();
    static ref STATUS_LINE: Regex = Regex::new(r"(?m)^#status\s+(\d+)").expect("status regex");
    static ref CD_HIT: Regex =
        Regex::new(r"(?i)(cd\d+)\s*[:\-]?\s*([^<>\n]{10,100})").expect("cd hit regex");
    static ref PFAM_HIT: Regex =
        Regex::new(r"(?i)(pfam\d+|PF\d+)\s*[:\-]?\s*([^<>\n]{10,100})").expect("pfam hit regex");
}

const READY_KEYWORDS: [&str; 5] = ["cd0", "pfam", "smart", "cog", "domain"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CddQuery {
    pub fasta: String,
    pub evalue: String,
    pub max_hits: String,
}

impl CddQuery {
    pub fn new(sequence: &ProteinSequence, config: &CddConfig) -> Self {
        Self {
            fasta: format!(">Query_sequence\n{}", sequence.as_str()),
            evalue: config.evalue.clone(),
            max_hits: config.max_hits.to_string(),
        }
    }

    pub fn form(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("queries", self.fasta.as_str()),
            ("db", "cdd"),
            ("evalue", self.evalue.as_str()),
            ("maxhit", self.max_hits.as_str()),
            ("dmode", "rep"),
            ("compbasedadj", "1"),
            ("filter", "true"),
        ]
    }
}

pub trait CddTransport: Send + Sync {
    /// Returns the raw submission reply.
    fn submit(&self, query: &CddQuery) -> Result<String, AnnotationError>;
    /// Returns the raw report for `search_id`, finished or not.
    fn report(&self, search_id: &str) -> Result<String, AnnotationError>;
}

pub struct HttpCddTransport {
    url: String,
    client: Client,
}

impl HttpCddTransport {
    pub fn new(config: &CddConfig) -> Result<Self, AnnotationError> {
        Ok(Self {
            url: config.url.clone(),
            client: build_client(Duration::from_secs(config.request_timeout_secs))?,
        })
    }
}

impl CddTransport for HttpCddTransport {
    fn submit(&self, query: &CddQuery) -> Result<String, AnnotationError> {
        let response = self
            .client
            .post(&self.url)
            .form(&query.form())
            .send()
            .map_err(|e| {
                AnnotationError::Submission(describe_send_error("CD-Search submission", &e))
            })?;
        success_text(response, "CD-Search submission").map_err(AnnotationError::Submission)
    }

    fn report(&self, search_id: &str) -> Result<String, AnnotationError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("cdsid", search_id), ("dmode", "rep")])
            .send()
            .map_err(|e| {
                AnnotationError::TransientNetwork(describe_send_error("CD-Search report", &e))
            })?;
        success_text(response, "CD-Search report").map_err(AnnotationError::TransientNetwork)
    }
}

pub fn extract_search_id(reply: &str) -> Option<String> {
    SEARCH_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(reply))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Reads the `#status` line of a report; without one, any domain keyword
/// means the report is ready.
pub fn interpret_report(report: &str) -> PollOutcome<()> {
    if let Some(code) = STATUS_LINE.captures(report).and_then(|c| c.get(1)) {
        return match code.as_str() {
            "0" => PollOutcome::Finished(()),
            "3" => PollOutcome::Running(format!("status {}", code.as_str())),
            other => PollOutcome::Failed(format!("status {other}")),
        };
    }
    let lower = report.to_ascii_lowercase();
    if READY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        PollOutcome::Finished(())
    } else {
        PollOutcome::Running("no domain data yet".to_string())
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn locate(report: &str, domain_id: &str, sequence_len: usize) -> Span {
    let pattern = format!(r"{}.*?(\d+)\s*[-.]{{1,3}}\s*(\d+)", regex::escape(domain_id));
    Regex::new(&pattern)
        .ok()
        .and_then(|re| re.captures(report))
        .and_then(|caps| {
            let start = caps.get(1)?.as_str().parse::<usize>().ok()?;
            let end = caps.get(2)?.as_str().parse::<usize>().ok()?;
            Span::clamped(start, end, sequence_len)
        })
        .unwrap_or_else(|| Span::default_for(sequence_len))
}

/// Scrapes `cd` accessions first, then Pfam accessions, keeping the first
/// [`MAX_CONSERVED_DOMAIN_MATCHES`].
pub fn parse_cdd_results(report: &str, sequence_len: usize) -> Vec<Match> {
    let cd_hits = CD_HIT.captures_iter(report).map(|caps| {
        let id = &caps[1];
        let description = caps[2].trim();
        Match::new(
            id,
            id.to_ascii_uppercase(),
            truncate_chars(description, 100),
            format!("Conserved domain: {}", truncate_chars(description, 80)),
            vec![locate(report, id, sequence_len)],
        )
        .with_superfamily("CDD superfamily")
        .with_bitscore(CD_BITSCORE)
    });
    let pfam_hits = PFAM_HIT.captures_iter(report).map(|caps| {
        let id = &caps[1];
        let description = caps[2].trim();
        Match::new(
            id,
            id.to_ascii_uppercase(),
            truncate_chars(description, 100),
            format!("Pfam domain: {}", truncate_chars(description, 80)),
            vec![Span::default_for(sequence_len)],
        )
        .with_superfamily("Pfam superfamily")
        .with_bitscore(PFAM_BITSCORE)
    });
    let matches: Vec<Match> = cd_hits
        .chain(pfam_hits)
        .take(MAX_CONSERVED_DOMAIN_MATCHES)
        .collect();
    debug!(count = matches.len(), "scraped CD-Search report");
    matches
}

pub struct CddClient {
    transport: Box<dyn CddTransport>,
    clock: Arc<dyn Clock>,
    config: CddConfig,
    schedule: PollSchedule,
}

impl CddClient {
    pub fn new(transport: Box<dyn CddTransport>, clock: Arc<dyn Clock>, config: &CddConfig) -> Self {
        Self {
            transport,
            clock,
            config: config.clone(),
            schedule: config.polling.schedule(),
        }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Result<Self, AnnotationError> {
        let transport = HttpCddTransport::new(&config.cdd)?;
        Ok(Self::new(Box::new(transport), Arc::new(SystemClock), &config.cdd))
    }

    pub fn submit(&self, sequence: &ProteinSequence) -> Result<ExternalJob, AnnotationError> {
        let reply = self
            .transport
            .submit(&CddQuery::new(sequence, &self.config))?;
        let search_id = extract_search_id(&reply).ok_or_else(|| {
            AnnotationError::Submission("no search id in CD-Search reply".to_string())
        })?;
        info!(%search_id, "submitted CD-Search job");
        Ok(ExternalJob::submitted(search_id, self.clock.now()))
    }

    /// Polls until the job is terminal and returns the finished report.
    pub fn poll(
        &self,
        job: &mut ExternalJob,
        cancel: &CancellationToken,
    ) -> Result<String, AnnotationError> {
        JobPoller::new(self.schedule, self.clock.as_ref(), cancel).run(job, |job| {
            let report = self.transport.report(job.job_id())?;
            Ok(match interpret_report(&report) {
                PollOutcome::Finished(()) => PollOutcome::Finished(report),
                PollOutcome::Running(status) => PollOutcome::Running(status),
                PollOutcome::Failed(status) => PollOutcome::Failed(status),
            })
        })
    }

    pub fn search(
        &self,
        sequence: &ProteinSequence,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>, AnnotationError> {
        let mut job = self.submit(sequence)?;
        let report = self.poll(&mut job, cancel)?;
        Ok(parse_cdd_results(&report, sequence.len()))
    }
}

impl MatchProducer for CddClient {
    fn source(&self) -> Source {
        Source::ConservedDomains
    }

    fn produce(
        &self,
        sequence: &ProteinSequence,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>, AnnotationError> {
        self.search(sequence, cancel)
    }

    fn is_remote(&self) -> bool {
        true
    }
}
