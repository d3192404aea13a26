//! InterProScan 5 client for the `domain_families` source.
//!
//! One request makes one submission, then polls `status/{id}` until the job
//! reaches a terminal state and reads `result/{id}/json` once it is finished.

use crate::{
    annotation::{MatchProducer, Source},
    annotation_match::{Match, normalize_locations},
    config::{AnnotatorConfig, InterProConfig},
    error::AnnotationError,
    http::{build_client, describe_send_error, success_text},
    job::{
        CancellationToken, Clock, ExternalJob, JobPoller, JobState, PollOutcome, PollSchedule,
        SystemClock,
    },
    protein_sequence::ProteinSequence,
};
use reqwest::{blocking::Client, header::ACCEPT};
use serde::Deserialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

pub const MAX_DOMAIN_FAMILY_MATCHES: usize = 5;
const FALLBACK_FUNCTION: &str = "Pfam protein family domain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub email: String,
    pub sequence: String,
    pub application: String,
}

impl SubmitRequest {
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("email", self.email.as_str()),
            ("sequence", self.sequence.as_str()),
            ("appl", self.application.as_str()),
            ("goterms", "false"),
            ("pathways", "false"),
        ]
    }
}

/// The three InterProScan endpoints. Submission faults are
/// [`AnnotationError::Submission`]; status and result faults are
/// [`AnnotationError::TransientNetwork`].
pub trait JobTransport: Send + Sync {
    fn submit(&self, request: &SubmitRequest) -> Result<String, AnnotationError>;
    fn status(&self, job_id: &str) -> Result<String, AnnotationError>;
    fn result(&self, job_id: &str) -> Result<String, AnnotationError>;
}

pub struct HttpJobTransport {
    base_url: String,
    submit_client: Client,
    status_client: Client,
    result_client: Client,
}

impl HttpJobTransport {
    pub fn new(config: &InterProConfig) -> Result<Self, AnnotationError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            submit_client: build_client(Duration::from_secs(config.submit_timeout_secs))?,
            status_client: build_client(Duration::from_secs(config.status_timeout_secs))?,
            result_client: build_client(Duration::from_secs(config.result_timeout_secs))?,
        })
    }

    fn get_text(&self, client: &Client, url: &str, what: &str) -> Result<String, AnnotationError> {
        let response = client
            .get(url)
            .send()
            .map_err(|e| AnnotationError::TransientNetwork(describe_send_error(what, &e)))?;
        success_text(response, what).map_err(AnnotationError::TransientNetwork)
    }
}

impl JobTransport for HttpJobTransport {
    fn submit(&self, request: &SubmitRequest) -> Result<String, AnnotationError> {
        let url = format!("{}/run", self.base_url);
        let response = self
            .submit_client
            .post(&url)
            .header(ACCEPT, "text/plain")
            .form(&request.form())
            .send()
            .map_err(|e| {
                AnnotationError::Submission(describe_send_error("InterProScan submission", &e))
            })?;
        let body = success_text(response, "InterProScan submission")
            .map_err(AnnotationError::Submission)?;
        let job_id = body.trim();
        if job_id.is_empty() {
            return Err(AnnotationError::Submission(
                "InterProScan returned an empty job id".to_string(),
            ));
        }
        Ok(job_id.to_string())
    }

    fn status(&self, job_id: &str) -> Result<String, AnnotationError> {
        let url = format!("{}/status/{job_id}", self.base_url);
        self.get_text(&self.status_client, &url, "InterProScan status")
            .map(|s| s.trim().to_string())
    }

    fn result(&self, job_id: &str) -> Result<String, AnnotationError> {
        let url = format!("{}/result/{job_id}/json", self.base_url);
        self.get_text(&self.result_client, &url, "InterProScan result")
    }
}

/// Maps an InterProScan status token; unknown tokens count as still running.
pub fn interpret_status(token: &str) -> PollOutcome<()> {
    let token = token.trim().to_ascii_uppercase();
    match token.as_str() {
        "FINISHED" => PollOutcome::Finished(()),
        "FAILURE" | "FAILED" | "ERROR" | "NOT_FOUND" => PollOutcome::Failed(token),
        _ => PollOutcome::Running(token),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureMatch {
    signature: Signature,
    #[serde(default, deserialize_with = "lenient_locations")]
    locations: Vec<Location>,
    #[serde(default)]
    evalue: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Signature {
    accession: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    signature_library_release: LibraryRelease,
}

#[derive(Debug, Deserialize)]
struct LibraryRelease {
    library: String,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    start: Option<i64>,
    #[serde(default)]
    end: Option<i64>,
}

impl Location {
    /// Both ends present and positive; range checks happen later.
    fn bounds(&self) -> Option<(usize, usize)> {
        let start = usize::try_from(self.start?).ok().filter(|&s| s >= 1)?;
        let end = usize::try_from(self.end?).ok().filter(|&e| e >= 1)?;
        Some((start, end))
    }
}

/// Entries that are not location objects are dropped instead of failing the match.
fn lenient_locations<'de, D>(deserializer: D) -> Result<Vec<Location>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| Location::deserialize(v).ok())
        .collect())
}

fn evalue_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_string(),
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

impl SignatureMatch {
    fn into_match(self, sequence_len: usize) -> Match {
        let Signature {
            accession,
            name,
            description,
            abstract_text,
            ..
        } = self.signature;
        let name = non_empty(name).unwrap_or_else(|| accession.clone());
        let description = non_empty(description).unwrap_or_else(|| name.clone());
        let function = non_empty(abstract_text).unwrap_or_else(|| FALLBACK_FUNCTION.to_string());
        let positions = normalize_locations(
            self.locations.iter().filter_map(Location::bounds),
            sequence_len,
        );
        Match::new(accession, name, description, function, positions)
            .with_evalue(evalue_text(self.evalue.as_ref()))
    }
}

/// Extracts `target_library` signatures from an InterProScan JSON payload.
///
/// Each match is decoded on its own; one that does not decode is skipped and
/// the matches before and after it are kept.
pub fn parse_interpro_results(
    payload: &str,
    target_library: &str,
    sequence_len: usize,
) -> Result<Vec<Match>, AnnotationError> {
    let root: Value = serde_json::from_str(payload)?;
    let results = root
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| AnnotationError::Parse("payload has no 'results' array".to_string()))?;
    let mut matches = Vec::new();
    let raw_matches = results
        .iter()
        .filter_map(|r| r.get("matches").and_then(Value::as_array))
        .flatten();
    for raw in raw_matches {
        let parsed = match SignatureMatch::deserialize(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "skipping malformed InterProScan match");
                continue;
            }
        };
        if !parsed
            .signature
            .signature_library_release
            .library
            .eq_ignore_ascii_case(target_library)
        {
            continue;
        }
        matches.push(parsed.into_match(sequence_len));
        if matches.len() == MAX_DOMAIN_FAMILY_MATCHES {
            break;
        }
    }
    debug!(count = matches.len(), library = target_library, "parsed InterProScan matches");
    Ok(matches)
}

pub struct InterProScanClient {
    transport: Box<dyn JobTransport>,
    clock: Arc<dyn Clock>,
    contact_email: String,
    application: String,
    target_library: String,
    schedule: PollSchedule,
}

impl InterProScanClient {
    pub fn new(
        transport: Box<dyn JobTransport>,
        clock: Arc<dyn Clock>,
        config: &InterProConfig,
        contact_email: &str,
    ) -> Self {
        Self {
            transport,
            clock,
            contact_email: contact_email.trim().to_string(),
            application: config.application.clone(),
            target_library: config.target_library.clone(),
            schedule: config.polling.schedule(),
        }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Result<Self, AnnotationError> {
        let transport = HttpJobTransport::new(&config.interpro)?;
        Ok(Self::new(
            Box::new(transport),
            Arc::new(SystemClock),
            &config.interpro,
            &config.contact_email,
        ))
    }

    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    pub fn submit(&self, sequence: &ProteinSequence) -> Result<ExternalJob, AnnotationError> {
        if self.contact_email.is_empty() {
            return Err(AnnotationError::Submission(
                "InterProScan requires a contact e-mail".to_string(),
            ));
        }
        let request = SubmitRequest {
            email: self.contact_email.clone(),
            sequence: sequence.as_str().to_string(),
            application: self.application.clone(),
        };
        let job_id = self.transport.submit(&request)?;
        info!(%job_id, application = %self.application, "submitted InterProScan job");
        Ok(ExternalJob::submitted(job_id, self.clock.now()))
    }

    /// Polls until `job` is terminal.
    pub fn poll(
        &self,
        job: &mut ExternalJob,
        cancel: &CancellationToken,
    ) -> Result<(), AnnotationError> {
        JobPoller::new(self.schedule, self.clock.as_ref(), cancel).run(job, |job| {
            let token = self.transport.status(job.job_id())?;
            Ok(interpret_status(&token))
        })
    }

    /// A job that has not finished has no results.
    pub fn retrieve(
        &self,
        job: &ExternalJob,
        sequence_len: usize,
    ) -> Result<Vec<Match>, AnnotationError> {
        if job.state() != JobState::Finished {
            debug!(job_id = job.job_id(), state = %job.state(), "no results for unfinished job");
            return Ok(Vec::new());
        }
        let payload = self.transport.result(job.job_id())?;
        parse_interpro_results(&payload, &self.target_library, sequence_len)
    }

    pub fn search(
        &self,
        sequence: &ProteinSequence,
        cancel: &CancellationToken,
    ) -> Result<Vec<Match>, AnnotationError> {
        let mut job = self.submit(sequence)?;
        self.poll(&mut job, cancel)?;
        self.retrieve(&job, sequence.len())
    }
}

impl MatchProducer for InterProScanClient {
    fn source(&self) -> Source {
        Source::DomainFamilies
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        annotation_match::Span,
        job::{STANDARD_MAX_ATTEMPTS, tests::FakeClock},
    };
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    const PFAM_PAYLOAD: &str = include_str!("../test_files/data/interpro.pfam.json");

    /// Answers status checks from a script; the last entry repeats.
    pub(crate) struct FakeJobTransport {
        pub submit_result: Result<String, String>,
        pub statuses: Vec<Result<String, String>>,
        pub payload: String,
        pub submits: AtomicUsize,
        pub status_calls: AtomicUsize,
        pub result_calls: AtomicUsize,
        pub last_request: Mutex<Option<SubmitRequest>>,
    }

    impl FakeJobTransport {
        pub(crate) fn new(statuses: &[&str], payload: &str) -> Self {
            Self {
                submit_result: Ok("iprscan5-R20261015-000001-0001-p1m".to_string()),
                statuses: statuses.iter().map(|s| Ok(s.to_string())).collect(),
                payload: payload.to_string(),
                submits: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                result_calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        pub(crate) fn rejecting_submission() -> Self {
            Self {
                submit_result: Err("HTTP 400 Bad Request".to_string()),
                ..Self::new(&["FINISHED"], "{}")
            }
        }
    }

    impl JobTransport for FakeJobTransport {
        fn submit(&self, request: &SubmitRequest) -> Result<String, AnnotationError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            self.submit_result
                .clone()
                .map_err(AnnotationError::Submission)
        }

        fn status(&self, _job_id: &str) -> Result<String, AnnotationError> {
            let n = self.status_calls.fetch_add(1, Ordering::SeqCst);
            let idx = n.min(self.statuses.len() - 1);
            self.statuses[idx]
                .clone()
                .map_err(AnnotationError::TransientNetwork)
        }

        fn result(&self, _job_id: &str) -> Result<String, AnnotationError> {
            self.result_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    impl JobTransport for Arc<FakeJobTransport> {
        fn submit(&self, request: &SubmitRequest) -> Result<String, AnnotationError> {
            self.as_ref().submit(request)
        }

        fn status(&self, job_id: &str) -> Result<String, AnnotationError> {
            self.as_ref().status(job_id)
        }

        fn result(&self, job_id: &str) -> Result<String, AnnotationError> {
            self.as_ref().result(job_id)
        }
    }

    pub(crate) fn client_with(
        transport: Arc<FakeJobTransport>,
        clock: Arc<FakeClock>,
    ) -> InterProScanClient {
        InterProScanClient::new(
            Box::new(transport),
            clock,
            &InterProConfig::default(),
            "lab@example.org",
        )
    }

    fn sequence(len: usize) -> ProteinSequence {
        ProteinSequence::new(&"MKVLA".repeat(len / 5)).unwrap()
    }

    #[test]
    fn test_status_tokens() {
        assert_eq!(interpret_status("FINISHED\n"), PollOutcome::Finished(()));
        for running in ["RUNNING", "QUEUED", "PENDING", "SOMETHING_NEW"] {
            assert!(matches!(interpret_status(running), PollOutcome::Running(_)));
        }
        for failed in ["FAILURE", "FAILED", "ERROR", "NOT_FOUND", "failed"] {
            assert!(matches!(interpret_status(failed), PollOutcome::Failed(_)));
        }
    }

    #[test]
    fn test_parse_pfam_fixture() {
        let matches = parse_interpro_results(PFAM_PAYLOAD, "PFAM", 300).unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.id()).collect();
        // PANTHER hit and the malformed entry are skipped
        assert_eq!(ids, vec!["PF00069", "PF07714", "PF00017"]);

        let kinase = &matches[0];
        assert_eq!(kinase.name(), "Pkinase");
        assert_eq!(kinase.description(), "Protein kinase domain");
        assert!(kinase.function().starts_with("Protein kinases"));
        assert_eq!(kinase.evalue(), Some("1.2e-45"));
        assert_eq!(kinase.positions().len(), 2);
        assert_eq!(kinase.positions()[0].start(), 12);
        assert_eq!(kinase.positions()[0].end(), 270);
        // end clamped to the sequence
        assert_eq!(kinase.positions()[1].end(), 300);

        let second = &matches[1];
        assert_eq!(second.description(), "PK_Tyr_Ser-Thr");
        assert_eq!(second.function(), FALLBACK_FUNCTION);
        assert_eq!(second.evalue(), Some("N/A"));

        // invalid location falls back to the default span
        let sh2 = &matches[2];
        assert_eq!(sh2.positions()[0].start(), 1);
        assert_eq!(sh2.positions()[0].end(), 50);
        assert!(matches.iter().all(|m| m.spans_within(300)));
    }

    #[test]
    fn test_parse_truncates_and_rejects_garbage() {
        let many: Vec<Value> = (0..8)
            .map(|i| {
                serde_json::json!({
                    "signature": {
                        "accession": format!("PF{i:05}"),
                        "name": "x",
                        "signatureLibraryRelease": {"library": "PFAM"}
                    },
                    "locations": [{"start": 1, "end": 10}]
                })
            })
            .collect();
        let payload = serde_json::json!({"results": [{"matches": many}]}).to_string();
        let matches = parse_interpro_results(&payload, "PFAM", 100).unwrap();
        assert_eq!(matches.len(), MAX_DOMAIN_FAMILY_MATCHES);
        assert_eq!(matches[4].id(), "PF00004");

        assert!(parse_interpro_results("<html>", "PFAM", 100).is_err());
        assert!(parse_interpro_results("{}", "PFAM", 100).is_err());
    }

    #[test]
    fn test_parse_keeps_matches_with_bad_locations() {
        let payload = serde_json::json!({"results": [{"matches": [
            {
                "signature": {"accession": "PF00001", "signatureLibraryRelease": {"library": "PFAM"}},
                "locations": [{"start": 5}]
            },
            {
                "signature": {"accession": "PF00002", "signatureLibraryRelease": {"library": "PFAM"}},
                "locations": [{"start": 5, "end": 20}, {"start": -3, "end": 8}, {"start": null, "end": 9}]
            },
            {
                "signature": {"accession": "PF00003", "signatureLibraryRelease": {"library": "PFAM"}},
                "locations": ["junk", {"start": 30, "end": 45}]
            }
        ]}]})
        .to_string();
        let matches = parse_interpro_results(&payload, "PFAM", 200).unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["PF00001", "PF00002", "PF00003"]);

        // missing end leaves nothing usable
        assert_eq!(matches[0].positions(), &[Span::default_for(200)]);
        let kept: Vec<_> = matches[1]
            .positions()
            .iter()
            .map(|s| (s.start(), s.end()))
            .collect();
        assert_eq!(kept, vec![(5, 20)]);
        assert_eq!(matches[2].positions()[0].start(), 30);
        assert_eq!(matches[2].positions()[0].end(), 45);
    }

    #[test]
    fn test_always_running_times_out() {
        let transport = Arc::new(FakeJobTransport::new(&["RUNNING"], PFAM_PAYLOAD));
        let clock = Arc::new(FakeClock::default());
        let client = client_with(transport.clone(), clock.clone());
        let res = client.search(&sequence(100), &CancellationToken::new());
        assert!(matches!(
            res,
            Err(AnnotationError::TimeoutExceeded { attempts }) if attempts == STANDARD_MAX_ATTEMPTS
        ));
        assert_eq!(transport.submits.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.status_calls.load(Ordering::SeqCst),
            STANDARD_MAX_ATTEMPTS
        );
        assert_eq!(transport.result_calls.load(Ordering::SeqCst), 0);
        assert_eq!(clock.total_slept(), Duration::from_secs(180));
    }

    #[test]
    fn test_search_finishes_and_parses() {
        let transport = Arc::new(FakeJobTransport::new(
            &["QUEUED", "RUNNING", "FINISHED"],
            PFAM_PAYLOAD,
        ));
        let clock = Arc::new(FakeClock::default());
        let client = client_with(transport.clone(), clock);
        let seq = sequence(300);
        let matches = client.search(&seq, &CancellationToken::new()).unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(transport.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(transport.result_calls.load(Ordering::SeqCst), 1);

        let request = transport.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.email, "lab@example.org");
        assert_eq!(request.sequence, seq.as_str());
        let form = request.form();
        assert!(form.contains(&("appl", "PfamA")));
        assert!(form.contains(&("goterms", "false")));
        assert!(form.contains(&("pathways", "false")));
    }

    #[test]
    fn test_failed_poll_does_not_resubmit() {
        let mut transport = FakeJobTransport::new(&[], PFAM_PAYLOAD);
        transport.statuses = vec![
            Err("connection reset".to_string()),
            Ok("RUNNING".to_string()),
            Ok("FINISHED".to_string()),
        ];
        let transport = Arc::new(transport);
        let client = client_with(transport.clone(), Arc::new(FakeClock::default()));
        let matches = client
            .search(&sequence(300), &CancellationToken::new())
            .unwrap();
        assert!(!matches.is_empty());
        assert_eq!(transport.submits.load(Ordering::SeqCst), 1);
        assert_eq!(transport.status_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_remote_failure_and_rejected_submission() {
        let transport = Arc::new(FakeJobTransport::new(&["RUNNING", "FAILURE"], PFAM_PAYLOAD));
        let client = client_with(transport.clone(), Arc::new(FakeClock::default()));
        let res = client.search(&sequence(100), &CancellationToken::new());
        assert!(matches!(res, Err(AnnotationError::JobFailed { .. })));
        assert_eq!(transport.result_calls.load(Ordering::SeqCst), 0);

        let transport = Arc::new(FakeJobTransport::rejecting_submission());
        let client = client_with(transport.clone(), Arc::new(FakeClock::default()));
        let res = client.search(&sequence(100), &CancellationToken::new());
        assert!(matches!(res, Err(AnnotationError::Submission(_))));
        assert_eq!(transport.status_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_contact_email_is_a_submission_error() {
        let transport = Arc::new(FakeJobTransport::new(&["FINISHED"], PFAM_PAYLOAD));
        let client = InterProScanClient::new(
            Box::new(transport.clone()),
            Arc::new(FakeClock::default()),
            &InterProConfig::default(),
            "  ",
        );
        let res = client.submit(&sequence(100));
        assert!(matches!(res, Err(AnnotationError::Submission(_))));
        assert_eq!(transport.submits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retrieve_requires_finished_job() {
        let transport = Arc::new(FakeJobTransport::new(&["FINISHED"], PFAM_PAYLOAD));
        let client = client_with(transport.clone(), Arc::new(FakeClock::default()));
        let job = client.submit(&sequence(100)).unwrap();
        assert_eq!(job.state(), JobState::Submitted);
        assert!(client.retrieve(&job, 100).unwrap().is_empty());
        assert_eq!(transport.result_calls.load(Ordering::SeqCst), 0);
    }
}
