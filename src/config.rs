//! Runtime configuration for the annotator and its remote clients.
//!
//! Every field has a default, so an empty JSON object is a valid config file.

use crate::{
    error::AnnotationError,
    job::{PATIENT_MAX_ATTEMPTS, PollSchedule, STANDARD_MAX_ATTEMPTS},
};
use serde::{Deserialize, Serialize};
use std::{fs, time::Duration};

pub const CONTACT_EMAIL_ENV: &str = "AMINOSCAN_CONTACT_EMAIL";

pub const DEFAULT_INTERPROSCAN_URL: &str = "https://www.ebi.ac.uk/Tools/services/rest/iprscan5";
pub const DEFAULT_CDD_URL: &str = "https://www.ncbi.nlm.nih.gov/Structure/bwrpsb/bwrpsb.cgi";
pub const DEFAULT_UNIPROT_SEARCH_URL: &str = "https://rest.uniprot.org/uniprotkb/search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Patience {
    #[default]
    Standard,
    Patient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub patience: Patience,
    /// Overrides the attempt count implied by `patience`.
    pub max_attempts: Option<usize>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            patience: Patience::Standard,
            max_attempts: None,
        }
    }
}

impl PollingConfig {
    pub fn schedule(&self) -> PollSchedule {
        let preset = match self.patience {
            Patience::Standard => STANDARD_MAX_ATTEMPTS,
            Patience::Patient => PATIENT_MAX_ATTEMPTS,
        };
        PollSchedule {
            interval: Duration::from_secs(self.interval_secs),
            max_attempts: self.max_attempts.unwrap_or(preset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterProConfig {
    pub base_url: String,
    /// Value of the `appl` form field.
    pub application: String,
    /// Signature library whose matches are reported.
    pub target_library: String,
    pub submit_timeout_secs: u64,
    pub status_timeout_secs: u64,
    pub result_timeout_secs: u64,
    pub polling: PollingConfig,
}

impl Default for InterProConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INTERPROSCAN_URL.to_string(),
            application: "PfamA".to_string(),
            target_library: "PFAM".to_string(),
            submit_timeout_secs: 30,
            status_timeout_secs: 10,
            result_timeout_secs: 30,
            polling: PollingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CddConfig {
    pub url: String,
    pub evalue: String,
    pub max_hits: usize,
    pub request_timeout_secs: u64,
    pub polling: PollingConfig,
}

impl Default for CddConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CDD_URL.to_string(),
            evalue: "0.01".to_string(),
            max_hits: 50,
            request_timeout_secs: 60,
            polling: PollingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniProtConfig {
    pub search_url: String,
    /// Accepted length difference between the query and a reference entry.
    pub length_window: usize,
    pub page_size: usize,
    pub entries_considered: usize,
    pub request_timeout_secs: u64,
}

impl Default for UniProtConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_UNIPROT_SEARCH_URL.to_string(),
            length_window: 20,
            page_size: 20,
            entries_considered: 10,
            request_timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Contact address sent with remote job submissions.
    pub contact_email: String,
    pub motif_library_path: Option<String>,
    pub interpro: InterProConfig,
    pub cdd: CddConfig,
    pub uniprot: UniProtConfig,
}

impl AnnotatorConfig {
    pub fn from_json(text: &str) -> Result<Self, AnnotationError> {
        serde_json::from_str(text)
            .map_err(|e| AnnotationError::Configuration(format!("invalid configuration: {e}")))
    }

    pub fn load_from_path(path: &str) -> Result<Self, AnnotationError> {
        let text = fs::read_to_string(path).map_err(|e| {
            AnnotationError::Configuration(format!("could not read configuration '{path}': {e}"))
        })?;
        Self::from_json(&text)
    }

    /// A non-empty `contact_email` replaces the configured one.
    pub fn with_contact_override(mut self, contact_email: Option<String>) -> Self {
        if let Some(email) = contact_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
        {
            self.contact_email = email;
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_contact_override(std::env::var(CONTACT_EMAIL_ENV).ok())
    }

    pub fn has_contact_email(&self) -> bool {
        !self.contact_email.trim().is_empty()
    }
}
