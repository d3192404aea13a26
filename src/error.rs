use thiserror::Error;

/// Why a position pattern could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("'{ch}' at offset {offset} is not one of the 20 canonical residues")]
    UnknownResidue { ch: char, offset: usize },
    #[error("unclosed '{open}' starting at offset {offset}")]
    Unclosed { open: char, offset: usize },
    #[error("empty residue set at offset {offset}")]
    EmptySet { offset: usize },
    #[error("repeat at offset {offset} has no preceding token")]
    DanglingRepeat { offset: usize },
    #[error("invalid repeat '({text})' at offset {offset}")]
    InvalidRepeat { text: String, offset: usize },
    #[error("'{anchor}' anchor at offset {offset} is not at the pattern edge")]
    MisplacedAnchor { anchor: char, offset: usize },
    #[error("pattern cannot be compiled: {0}")]
    Regex(String),
}

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("motif '{id}' has an invalid pattern: {source}")]
    Pattern {
        id: String,
        #[source]
        source: PatternError,
    },
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),
    #[error("job submission failed: {0}")]
    Submission(String),
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("job did not finish within {attempts} status checks")]
    TimeoutExceeded { attempts: usize },
    #[error("job {job_id} failed remotely with status {status}")]
    JobFailed { job_id: String, status: String },
    #[error("could not parse result payload: {0}")]
    Parse(String),
    #[error("job was abandoned by the caller")]
    Cancelled,
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },
}

impl AnnotationError {
    /// Errors that stop the whole request instead of one source.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            AnnotationError::Configuration(_)
                | AnnotationError::Pattern { .. }
                | AnnotationError::InvalidSequence(_)
        )
    }
}

impl From<serde_json::Error> for AnnotationError {
    fn from(err: serde_json::Error) -> Self {
        AnnotationError::Parse(err.to_string())
    }
}
