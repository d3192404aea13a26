//! Motif pattern registry.

use crate::{error::AnnotationError, position_pattern::CompiledPattern};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs};
use tracing::debug;

const MOTIF_SCHEMA_PREFIX: &str = "aminoscan.motifs.v";
const BUILTIN_MOTIFS_JSON: &str = include_str!("../assets/motifs.json");

#[derive(Debug, Clone, Deserialize)]
struct MotifSnapshot {
    schema: String,
    motifs: Vec<MotifRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct MotifRecord {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    pattern: String,
    #[serde(default)]
    function: String,
}

/// One library entry with its compiled matcher.
#[derive(Debug, Clone)]
pub struct MotifPattern {
    pub id: String,
    pub name: String,
    pub description: String,
    pub function_text: String,
    matcher: CompiledPattern,
}

impl MotifPattern {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        position_pattern: &str,
        function_text: &str,
    ) -> Result<Self, AnnotationError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AnnotationError::Configuration(format!(
                "motif with pattern '{position_pattern}' has no id"
            )));
        }
        let matcher =
            CompiledPattern::compile(position_pattern).map_err(|source| AnnotationError::Pattern {
                id: id.to_string(),
                source,
            })?;
        Ok(Self {
            id: id.to_string(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            function_text: function_text.trim().to_string(),
            matcher,
        })
    }

    pub fn position_pattern(&self) -> &str {
        self.matcher.source()
    }

    pub fn matcher(&self) -> &CompiledPattern {
        &self.matcher
    }

    pub fn summary(&self) -> MotifSummary {
        MotifSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            pattern: self.position_pattern().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MotifSummary {
    pub id: String,
    pub name: String,
    pub pattern: String,
}

/// Immutable, ordered motif table. Share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct MotifLibrary {
    motifs: Vec<MotifPattern>,
    by_key: HashMap<String, usize>,
}

impl MotifLibrary {
    pub fn from_patterns(motifs: Vec<MotifPattern>) -> Result<Self, AnnotationError> {
        let mut by_key = HashMap::new();
        for (idx, motif) in motifs.iter().enumerate() {
            let id_key = motif.id.to_ascii_uppercase();
            if by_key.insert(id_key, idx).is_some() {
                return Err(AnnotationError::Configuration(format!(
                    "duplicate motif id '{}'",
                    motif.id
                )));
            }
        }
        for (idx, motif) in motifs.iter().enumerate() {
            let name_key = motif.name.to_ascii_uppercase();
            if !name_key.is_empty() {
                by_key.entry(name_key).or_insert(idx);
            }
        }
        Ok(Self { motifs, by_key })
    }

    pub fn from_json(text: &str) -> Result<Self, AnnotationError> {
        let snapshot = serde_json::from_str::<MotifSnapshot>(text).map_err(|e| {
            AnnotationError::Configuration(format!("could not parse motif library: {e}"))
        })?;
        if !snapshot.schema.starts_with(MOTIF_SCHEMA_PREFIX) {
            return Err(AnnotationError::Configuration(format!(
                "unsupported motif library schema '{}'",
                snapshot.schema
            )));
        }
        let motifs = snapshot
            .motifs
            .iter()
            .map(|m| MotifPattern::new(&m.id, &m.name, &m.description, &m.pattern, &m.function))
            .collect::<Result<Vec<_>, _>>()?;
        if motifs.is_empty() {
            return Err(AnnotationError::Configuration(
                "motif library contains no motifs".to_string(),
            ));
        }
        Self::from_patterns(motifs)
    }

    pub fn load_from_path(path: &str) -> Result<Self, AnnotationError> {
        let text = fs::read_to_string(path).map_err(|e| {
            AnnotationError::Configuration(format!("could not read motif library '{path}': {e}"))
        })?;
        let library = Self::from_json(&text)?;
        debug!(path, motifs = library.len(), "loaded motif library");
        Ok(library)
    }

    pub fn builtin() -> Result<Self, AnnotationError> {
        Self::from_json(BUILTIN_MOTIFS_JSON)
    }

    /// The file at `path` if given, the built-in table otherwise.
    pub fn load(path: Option<&str>) -> Result<Self, AnnotationError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::builtin(),
        }
    }

    pub fn motifs(&self) -> &[MotifPattern] {
        &self.motifs
    }

    pub fn len(&self) -> usize {
        self.motifs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motifs.is_empty()
    }

    /// Looks up a motif by id or name, case-insensitively.
    pub fn resolve(&self, token: &str) -> Option<&MotifPattern> {
        let key = token.trim().to_ascii_uppercase();
        let idx = self.by_key.get(&key)?;
        self.motifs.get(*idx)
    }

    pub fn summaries(&self) -> Vec<MotifSummary> {
        self.motifs.iter().map(MotifPattern::summary).collect()
    }
}
