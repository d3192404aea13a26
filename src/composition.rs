//! Residue composition statistics and the heuristic domain classifier.

use crate::{
    amino_acids::{AMINO_ACID_ALPHABET, AMINO_ACID_COUNT, residue_index},
    annotation::{MatchProducer, Source},
    annotation_match::{Match, Span},
    error::AnnotationError,
    job::CancellationToken,
    protein_sequence::ProteinSequence,
};
use serde::Serialize;

pub const MAX_COMPOSITION_MATCHES: usize = 6;

/// Occurrence count per canonical residue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResidueComposition {
    length: usize,
    counts: [usize; AMINO_ACID_COUNT],
}

impl ResidueComposition {
    pub fn new_from_sequence(sequence: &[u8]) -> Self {
        let mut counts = [0usize; AMINO_ACID_COUNT];
        for idx in sequence.iter().filter_map(|b| residue_index(*b)) {
            counts[idx] += 1;
        }
        Self {
            length: sequence.len(),
            counts,
        }
    }

    #[inline(always)]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline(always)]
    pub fn count(&self, residue: u8) -> usize {
        residue_index(residue).map_or(0, |idx| self.counts[idx])
    }

    pub fn count_of(&self, residues: &[u8]) -> usize {
        residues.iter().map(|r| self.count(*r)).sum()
    }

    /// `true` when the residues make up strictly more than `percent` of the sequence.
    pub fn exceeds_percent(&self, residues: &[u8], percent: usize) -> bool {
        self.count_of(residues) * 100 > percent * self.length
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, usize)> + '_ {
        AMINO_ACID_ALPHABET
            .iter()
            .zip(self.counts.iter())
            .map(|(letter, count)| (*letter as char, *count))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleCondition {
    /// Length strictly above `min_length` and `motif` present as a substring.
    LengthAndSubstring {
        min_length: usize,
        motif: &'static str,
    },
    /// Every listed residue occurs at least the given number of times.
    MinimumCounts(&'static [(u8, usize)]),
    /// Length strictly above `min_length` and the residues exceed `percent` of it.
    PercentAbove {
        residues: &'static [u8],
        percent: usize,
        min_length: usize,
    },
}

impl RuleCondition {
    pub fn holds(&self, residues: &[u8], composition: &ResidueComposition) -> bool {
        match *self {
            RuleCondition::LengthAndSubstring { min_length, motif } => {
                composition.length() > min_length
                    && residues
                        .windows(motif.len())
                        .any(|w| w.eq_ignore_ascii_case(motif.as_bytes()))
            }
            RuleCondition::MinimumCounts(minimums) => minimums
                .iter()
                .all(|(residue, min)| composition.count(*residue) >= *min),
            RuleCondition::PercentAbove {
                residues: members,
                percent,
                min_length,
            } => composition.length() > min_length && composition.exceeds_percent(members, percent),
        }
    }
}

/// One row of the classifier table: a condition plus the fixed metadata it emits.
#[derive(Clone, Copy, Debug)]
pub struct CompositionRule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub function: &'static str,
    pub superfamily: &'static str,
    pub span: (usize, usize),
    pub bitscore: f64,
    pub evalue: &'static str,
    pub condition: RuleCondition,
}

impl CompositionRule {
    fn to_match(&self, sequence_len: usize) -> Match {
        let span = Span::clamped(self.span.0, self.span.1, sequence_len)
            .unwrap_or_else(|| Span::default_for(sequence_len));
        Match::new(self.id, self.name, self.description, self.function, vec![span])
            .with_superfamily(self.superfamily)
            .with_bitscore(self.bitscore)
            .with_evalue(self.evalue)
    }
}

pub const COMPOSITION_RULES: &[CompositionRule] = &[
    CompositionRule {
        id: "PF00069",
        name: "Pkinase",
        description: "Protein kinase domain",
        function: "Catalytic domain transferring phosphate from ATP to serine, threonine or tyrosine",
        superfamily: "Protein kinase-like (PK-like)",
        span: (10, 270),
        bitscore: 85.0,
        evalue: "1.0e-20",
        condition: RuleCondition::LengthAndSubstring {
            min_length: 200,
            motif: "GK",
        },
    },
    CompositionRule {
        id: "PF00096",
        name: "zf-C2H2",
        description: "Zinc finger, C2H2 type",
        function: "Zinc-coordinating fold that binds nucleic acids",
        superfamily: "beta-beta-alpha zinc fingers",
        span: (1, 23),
        bitscore: 45.0,
        evalue: "1.0e-08",
        condition: RuleCondition::MinimumCounts(&[(b'C', 4), (b'H', 2)]),
    },
    CompositionRule {
        id: "PF00036",
        name: "EF-hand_1",
        description: "EF hand",
        function: "Helix-loop-helix calcium-binding motif",
        superfamily: "EF-hand",
        span: (1, 29),
        bitscore: 40.0,
        evalue: "1.0e-06",
        condition: RuleCondition::PercentAbove {
            residues: b"DE",
            percent: 10,
            min_length: 0,
        },
    },
    CompositionRule {
        id: "PF00047",
        name: "ig",
        description: "Immunoglobulin domain",
        function: "Beta-sandwich fold mediating protein-protein recognition",
        superfamily: "Immunoglobulin",
        span: (1, 100),
        bitscore: 55.0,
        evalue: "1.0e-12",
        condition: RuleCondition::PercentAbove {
            residues: b"VILF",
            percent: 30,
            min_length: 100,
        },
    },
    CompositionRule {
        id: "PF01381",
        name: "HTH_3",
        description: "Helix-turn-helix",
        function: "DNA-binding helix-turn-helix motif",
        superfamily: "lambda repressor-like DNA-binding domains",
        span: (1, 55),
        bitscore: 35.0,
        evalue: "1.0e-05",
        condition: RuleCondition::PercentAbove {
            residues: b"RK",
            percent: 15,
            min_length: 0,
        },
    },
];

/// Applies `rules` in order to `sequence`; each firing rule adds one match.
pub fn classify_with(sequence: &[u8], rules: &[CompositionRule]) -> Vec<Match> {
    let composition = ResidueComposition::new_from_sequence(sequence);
    rules
        .iter()
        .filter(|rule| rule.condition.holds(sequence, &composition))
        .take(MAX_COMPOSITION_MATCHES)
        .map(|rule| rule.to_match(sequence.len()))
        .collect()
}

pub fn classify(sequence: &ProteinSequence) -> Vec<Match> {
    classify_with(sequence.as_bytes(), COMPOSITION_RULES)
}

#[derive(Clone, Debug, Serialize)]
pub struct CompositionReport {
    pub length: usize,
    pub counts: Vec<(char, usize)>,
    pub matches: Vec<Match>,
}

impl CompositionReport {
    pub fn new(sequence: &ProteinSequence) -> Self {
        let composition = ResidueComposition::new_from_sequence(sequence.as_bytes());
        Self {
            length: composition.length(),
            counts: composition.iter().filter(|(_, n)| *n > 0).collect(),
            matches: classify(sequence),
        }
    }
}

/// The `composition_domains` producer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositionClassifier;

impl MatchProducer for CompositionClassifier {
    fn source(&self) -> Source {
        Source::CompositionDomains
    }

    fn produce(
        &self,
        sequence: &ProteinSequence,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Match>, AnnotationError> {
        Ok(classify(sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> ProteinSequence {
        ProteinSequence::new(s).unwrap()
    }

    fn ids(matches: &[Match]) -> Vec<&str> {
        matches.iter().map(|m| m.id()).collect()
    }

    #[test]
    fn test_counts() {
        let c = ResidueComposition::new_from_sequence(b"CCHHAAAAAD");
        assert_eq!(c.length(), 10);
        assert_eq!(c.count(b'C'), 2);
        assert_eq!(c.count(b'A'), 5);
        assert_eq!(c.count(b'W'), 0);
        assert_eq!(c.count_of(b"CHD"), 5);
        assert!(c.exceeds_percent(b"A", 49));
        assert!(!c.exceeds_percent(b"A", 50));
        assert_eq!(c.iter().map(|(_, n)| n).sum::<usize>(), 10);
    }

    #[test]
    fn test_only_zinc_finger_rule_fires() {
        // 50 residues: 4 C, 2 H, no GK, 2 D/E, no VILF, 2 R/K.
        let s = format!("CCCCHH{}DEKR{}", "A".repeat(20), "S".repeat(20));
        assert_eq!(s.len(), 50);
        let matches = classify(&seq(&s));
        assert_eq!(ids(&matches), vec!["PF00096"]);
        let span = matches[0].positions()[0];
        assert_eq!((span.start(), span.end()), (1, 23));
        assert_eq!(matches[0].superfamily(), Some("beta-beta-alpha zinc fingers"));
    }

    #[test]
    fn test_thresholds_are_strict() {
        // Exactly 10% acidic and 15% basic: neither rule fires.
        let basic = format!("{}{}", "K".repeat(8), "R".repeat(7));
        let s = format!("{}{}{}{basic}", "D".repeat(5), "E".repeat(5), "A".repeat(75));
        assert_eq!(s.len(), 100);
        assert!(classify(&seq(&s)).is_empty());
        // One more acidic residue tips the EF-hand rule.
        let s = format!("{}{}{}{basic}", "D".repeat(6), "E".repeat(5), "A".repeat(74));
        assert_eq!(ids(&classify(&seq(&s))), vec!["PF00036"]);
    }

    #[test]
    fn test_kinase_requires_length_and_gk() {
        let short = format!("GK{}", "A".repeat(198));
        assert!(classify(&seq(&short)).is_empty());
        let long = format!("GK{}", "A".repeat(199));
        let matches = classify(&seq(&long));
        assert_eq!(ids(&matches), vec!["PF00069"]);
        let span = matches[0].positions()[0];
        assert_eq!((span.start(), span.end()), (10, 201));
        let no_gk = format!("KG{}", "A".repeat(199));
        assert!(classify(&seq(&no_gk)).is_empty());
    }

    #[test]
    fn test_immunoglobulin_requires_length() {
        let hydrophobic = "VILF".repeat(10);
        let short = format!("{hydrophobic}{}", "A".repeat(60));
        assert!(classify(&seq(&short)).is_empty());
        let long = format!("{hydrophobic}{}", "A".repeat(61));
        assert_eq!(ids(&classify(&seq(&long))), vec!["PF00047"]);
    }

    #[test]
    fn test_rules_keep_table_order() {
        // Long, cysteine/histidine rich, acidic, hydrophobic and basic.
        let s = format!(
            "GK{}{}{}{}{}",
            "CCCCHH",
            "DE".repeat(20),
            "VILF".repeat(20),
            "RK".repeat(20),
            "A".repeat(72)
        );
        let matches = classify(&seq(&s));
        assert_eq!(
            ids(&matches),
            vec!["PF00069", "PF00096", "PF00036", "PF00047", "PF01381"]
        );
        assert!(matches.len() <= MAX_COMPOSITION_MATCHES);
        assert!(matches.iter().all(|m| m.spans_within(s.len())));
        assert_eq!(classify(&seq(&s)), matches);
    }

    #[test]
    fn test_spans_clamped_to_short_sequences() {
        let matches = classify(&seq("CCCCHHAAAA"));
        assert_eq!(ids(&matches), vec!["PF00096"]);
        let span = matches[0].positions()[0];
        assert_eq!((span.start(), span.end()), (1, 10));
    }

    #[test]
    fn test_truncation_with_custom_table() {
        let always = CompositionRule {
            condition: RuleCondition::MinimumCounts(&[]),
            ..COMPOSITION_RULES[1]
        };
        let rules = vec![always; 9];
        assert_eq!(classify_with(b"AAAAAAAAAA", &rules).len(), MAX_COMPOSITION_MATCHES);
    }
}
