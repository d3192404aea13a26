use crate::{amino_acids::is_canonical_residue, error::AnnotationError};
use serde::{Serialize, Serializer};
use std::fmt;

pub const MIN_SEQUENCE_LENGTH: usize = 10;
pub const MAX_SEQUENCE_LENGTH: usize = 2000;

/// An upper-case protein sequence over the 20 canonical residues.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProteinSequence {
    residues: String,
}

impl ProteinSequence {
    /// Validates raw user input: whitespace is dropped, letters are upper-cased.
    pub fn new(text: &str) -> Result<Self, AnnotationError> {
        let residues: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if residues.is_empty() {
            return Err(AnnotationError::InvalidSequence(
                "no sequence provided".to_string(),
            ));
        }
        if let Some((pos, bad)) = residues
            .char_indices()
            .find(|(_, c)| !c.is_ascii() || !is_canonical_residue(*c as u8))
        {
            return Err(AnnotationError::InvalidSequence(format!(
                "'{bad}' at position {} is not a canonical amino acid",
                pos + 1
            )));
        }
        if residues.len() < MIN_SEQUENCE_LENGTH {
            return Err(AnnotationError::InvalidSequence(format!(
                "sequence too short ({} residues, minimum {MIN_SEQUENCE_LENGTH})",
                residues.len()
            )));
        }
        if residues.len() > MAX_SEQUENCE_LENGTH {
            return Err(AnnotationError::InvalidSequence(format!(
                "sequence too long ({} residues, maximum {MAX_SEQUENCE_LENGTH})",
                residues.len()
            )));
        }
        Ok(Self { residues })
    }

    /// Accepts plain or FASTA text; header (`>`) and comment (`;`) lines are skipped.
    /// Only the first record is read.
    pub fn from_fasta_text(text: &str) -> Result<Self, AnnotationError> {
        let mut body = String::new();
        let mut seen_header = false;
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with('>') {
                if seen_header && !body.is_empty() {
                    break;
                }
                seen_header = true;
                continue;
            }
            if line.starts_with(';') {
                continue;
            }
            body.push_str(line);
        }
        Self::new(&body)
    }

    pub fn as_str(&self) -> &str {
        &self.residues
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.residues.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
}

impl fmt::Display for ProteinSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.residues)
    }
}

impl Serialize for ProteinSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.residues)
    }
}
