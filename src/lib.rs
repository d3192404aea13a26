pub mod about;
pub mod amino_acids;
pub mod annotation;
pub mod annotation_match;
pub mod cdd;
pub mod composition;
pub mod config;
pub mod error;
mod http;
pub mod interpro;
pub mod job;
pub mod motif_library;
pub mod motif_search;
pub mod position_pattern;
pub mod protein_sequence;
pub mod uniprot;

pub use annotation::{AnnotationResult, Annotator, MatchProducer, Source};
pub use annotation_match::{Match, Span};
pub use config::AnnotatorConfig;
pub use error::{AnnotationError, PatternError};
pub use protein_sequence::ProteinSequence;
