//! The normalized match model shared by every annotation source.

use serde::{Deserialize, Serialize};

/// End of the default span used when a source reports no usable location.
pub const DEFAULT_SPAN_END: usize = 50;

/// A 1-based, inclusive residue range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Returns `None` unless `1 <= start <= end <= sequence_len`.
    pub fn new(start: usize, end: usize, sequence_len: usize) -> Option<Self> {
        if start >= 1 && start <= end && end <= sequence_len {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Converts a 0-based half-open regex hit into a span.
    pub fn from_offset(offset: usize, length: usize, sequence_len: usize) -> Option<Self> {
        Self::new(offset + 1, offset + length, sequence_len)
    }

    /// Like [`Span::new`], but an end past the sequence is pulled back to the last residue.
    pub fn clamped(start: usize, end: usize, sequence_len: usize) -> Option<Self> {
        Self::new(start, end.min(sequence_len), sequence_len)
    }

    /// `1..=min(50, len)`. Needs a non-empty sequence.
    pub fn default_for(sequence_len: usize) -> Self {
        Self {
            start: 1,
            end: DEFAULT_SPAN_END.min(sequence_len).max(1),
        }
    }

    #[inline(always)]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline(always)]
    pub fn end(&self) -> usize {
        self.end
    }
}

/// One source-attributed annotation hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    id: String,
    name: String,
    description: String,
    function: String,
    positions: Vec<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evalue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bitscore: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    superfamily: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_protein: Option<String>,
}

impl Match {
    /// `positions` must not be empty; producers substitute [`Span::default_for`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        function: impl Into<String>,
        positions: Vec<Span>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            function: function.into(),
            positions,
            pattern: None,
            evalue: None,
            bitscore: None,
            superfamily: None,
            source_protein: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_evalue(mut self, evalue: impl Into<String>) -> Self {
        self.evalue = Some(evalue.into());
        self
    }

    pub fn with_bitscore(mut self, bitscore: f64) -> Self {
        self.bitscore = Some(bitscore);
        self
    }

    pub fn with_superfamily(mut self, superfamily: impl Into<String>) -> Self {
        self.superfamily = Some(superfamily.into());
        self
    }

    pub fn with_source_protein(mut self, accession: impl Into<String>) -> Self {
        self.source_protein = Some(accession.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn positions(&self) -> &[Span] {
        &self.positions
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    pub fn evalue(&self) -> Option<&str> {
        self.evalue.as_deref()
    }

    pub fn bitscore(&self) -> Option<f64> {
        self.bitscore
    }

    pub fn superfamily(&self) -> Option<&str> {
        self.superfamily.as_deref()
    }

    pub fn source_protein(&self) -> Option<&str> {
        self.source_protein.as_deref()
    }

    /// True when every position lies within `1..=sequence_len`.
    pub fn spans_within(&self, sequence_len: usize) -> bool {
        !self.positions.is_empty()
            && self
                .positions
                .iter()
                .all(|s| s.start >= 1 && s.start <= s.end && s.end <= sequence_len)
    }
}

/// Keeps locations that fit the sequence (ends clamped), or the default span if none do.
pub fn normalize_locations(
    locations: impl IntoIterator<Item = (usize, usize)>,
    sequence_len: usize,
) -> Vec<Span> {
    let spans: Vec<Span> = locations
        .into_iter()
        .filter_map(|(start, end)| Span::clamped(start, end, sequence_len))
        .collect();
    if spans.is_empty() {
        vec![Span::default_for(sequence_len)]
    } else {
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_span_bounds() {
        assert!(Span::new(1, 1, 10).is_some());
        assert!(Span::new(1, 10, 10).is_some());
        assert!(Span::new(0, 5, 10).is_none());
        assert!(Span::new(6, 5, 10).is_none());
        assert!(Span::new(5, 11, 10).is_none());
        let hit = Span::from_offset(2, 3, 9).unwrap();
        assert_eq!((hit.start(), hit.end()), (3, 5));
    }

    #[test]
    fn test_default_span_respects_short_sequences() {
        let short = Span::default_for(12);
        assert_eq!((short.start(), short.end()), (1, 12));
        let long = Span::default_for(400);
        assert_eq!((long.start(), long.end()), (1, 50));
    }

    #[test]
    fn test_normalize_locations() {
        let spans = normalize_locations(vec![(5, 30), (40, 900), (0, 3), (70, 60)], 100);
        assert_eq!(spans, vec![Span::new(5, 30, 100).unwrap(), Span::new(40, 100, 100).unwrap()]);
        let fallback = normalize_locations(vec![(120, 130)], 100);
        assert_eq!(fallback, vec![Span::default_for(100)]);
    }

    #[test]
    fn test_serialization_skips_absent_optionals() {
        let m = Match::new("PS00005", "PKC_PHOSPHO_SITE", "d", "f", vec![Span::new(3, 5, 9).unwrap()])
            .with_pattern("[ST]-x-[RK]");
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "PS00005",
                "name": "PKC_PHOSPHO_SITE",
                "description": "d",
                "function": "f",
                "positions": [{"start": 3, "end": 5}],
                "pattern": "[ST]-x-[RK]"
            })
        );
        assert!(m.spans_within(9));
        assert!(!m.spans_within(4));
    }
}
