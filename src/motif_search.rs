use crate::{
    annotation::{MatchProducer, Source},
    annotation_match::Match,
    error::AnnotationError,
    job::CancellationToken,
    motif_library::MotifLibrary,
    protein_sequence::ProteinSequence,
};
use std::sync::Arc;

pub const MAX_MOTIF_MATCHES: usize = 5;

/// Scans `sequence` with every library pattern, in library order, and keeps
/// the first [`MAX_MOTIF_MATCHES`] hits.
pub fn find_motifs(sequence: &ProteinSequence, library: &MotifLibrary) -> Vec<Match> {
    let residues = sequence.as_str().to_ascii_uppercase();
    library
        .motifs()
        .iter()
        .flat_map(|motif| {
            motif
                .matcher()
                .find_spans(&residues)
                .into_iter()
                .map(move |span| {
                    Match::new(
                        &motif.id,
                        &motif.name,
                        &motif.description,
                        &motif.function_text,
                        vec![span],
                    )
                    .with_pattern(motif.position_pattern())
                })
        })
        .take(MAX_MOTIF_MATCHES)
        .collect()
}

/// The `pattern_motifs` producer.
#[derive(Debug, Clone)]
pub struct MotifSearch {
    library: Arc<MotifLibrary>,
}

impl MotifSearch {
    pub fn new(library: Arc<MotifLibrary>) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &MotifLibrary {
        &self.library
    }
}

impl MatchProducer for MotifSearch {
    fn source(&self) -> Source {
        Source::PatternMotifs
    }

    fn produce(
        &self,
        sequence: &ProteinSequence,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Match>, AnnotationError> {
        Ok(find_motifs(sequence, &self.library))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motif_library::MotifPattern;

    fn library(entries: &[(&str, &str)]) -> MotifLibrary {
        let motifs = entries
            .iter()
            .map(|(id, pattern)| MotifPattern::new(id, id, "", pattern, "").unwrap())
            .collect();
        MotifLibrary::from_patterns(motifs).unwrap()
    }

    fn seq(s: &str) -> ProteinSequence {
        ProteinSequence::new(s).unwrap()
    }

    #[test]
    fn test_library_then_position_order() {
        let lib = library(&[("KK", "K-K"), ("RGD", "R-G-D")]);
        let hits = find_motifs(&seq("RGDAKKAKKARGD"), &lib);
        let got: Vec<_> = hits
            .iter()
            .map(|m| (m.id(), m.positions()[0].start(), m.positions()[0].end()))
            .collect();
        assert_eq!(
            got,
            vec![("KK", 5, 6), ("KK", 8, 9), ("RGD", 1, 3), ("RGD", 11, 13)]
        );
        assert_eq!(hits[0].pattern(), Some("K-K"));
    }

    #[test]
    fn test_truncates_to_first_five() {
        let lib = library(&[("A", "A"), ("W", "W")]);
        let hits = find_motifs(&seq("WAAAAAAAAW"), &lib);
        assert_eq!(hits.len(), MAX_MOTIF_MATCHES);
        assert!(hits.iter().all(|m| m.id() == "A"));
        assert_eq!(hits[4].positions()[0].start(), 6);
    }

    #[test]
    fn test_no_hits_is_empty() {
        let lib = library(&[("RGD", "R-G-D")]);
        assert!(find_motifs(&seq("MKTAYIAKQRQISFVK"), &lib).is_empty());
    }

    #[test]
    fn test_builtin_library_is_deterministic_and_in_bounds() {
        let lib = MotifLibrary::builtin().unwrap();
        let s = seq("MGSSKSKPKDPSQRRRSLEPAENVHGAGGGAFPASQTPSKPASADGHRGPSAAFAPAAAEPKLFGGFNSSDTVTSPQRAGPLAGGVTTFVALYDYESRTETDLSFKKGERLQIVNNTEGDWWLAHSLSTGQTGYIPSNYVAPSDSIQAEEWYFGKITRRESERLLLNAENPRGTFLVRESETTKGAYCLSVSDFDNAKGLNVKHYKIRKLDSGGFYITSRTQFNSLQQLVAYYSKHADGLCHRLTTVCPTSK");
        let first = find_motifs(&s, &lib);
        let second = find_motifs(&s, &lib);
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert!(first.len() <= MAX_MOTIF_MATCHES);
        assert!(first.iter().all(|m| m.spans_within(s.len())));
    }
}
