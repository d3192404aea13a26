//! Position-pattern micro-grammar.
//!
//! Patterns use PROSITE notation: literal residues, allowed sets `[ST]`,
//! excluded sets `{P}`, the wildcard `x`, and repeats `(n)` / `(n,m)` applying
//! to the preceding token. `-` separates tokens, a leading `<` anchors to the
//! N-terminus, a trailing `>` to the C-terminus, and a final `.` is ignored.

use crate::{
    amino_acids::{ResidueSet, residue_index},
    annotation_match::Span,
    error::PatternError,
};
use regex::{Regex, RegexBuilder};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternElement {
    Residue(u8),
    AnyOf(ResidueSet),
    NoneOf(ResidueSet),
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternToken {
    pub element: PatternElement,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionPattern {
    n_terminal: bool,
    c_terminal: bool,
    tokens: Vec<PatternToken>,
}

impl PositionPattern {
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut tokens: Vec<PatternToken> = vec![];
        let mut repeated: Vec<bool> = vec![];
        let mut n_terminal = false;
        let mut c_terminal = false;
        let mut i = 0usize;

        while i < chars.len() {
            let (offset, ch) = chars[i];
            if c_terminal && !is_trailer(ch) {
                return Err(PatternError::MisplacedAnchor { anchor: '>', offset });
            }
            match ch {
                '-' => i += 1,
                c if c.is_whitespace() => i += 1,
                '.' => {
                    if chars[i + 1..].iter().any(|(_, c)| !c.is_whitespace()) {
                        return Err(PatternError::UnexpectedChar { ch, offset });
                    }
                    i += 1;
                }
                '<' => {
                    if n_terminal || !tokens.is_empty() {
                        return Err(PatternError::MisplacedAnchor { anchor: '<', offset });
                    }
                    n_terminal = true;
                    i += 1;
                }
                '>' => {
                    c_terminal = true;
                    i += 1;
                }
                'x' | 'X' => {
                    tokens.push(PatternToken::once(PatternElement::Any));
                    repeated.push(false);
                    i += 1;
                }
                '[' | '{' => {
                    let close = if ch == '[' { ']' } else { '}' };
                    let (set, next) = read_set(&chars, i, close)?;
                    let element = if ch == '[' {
                        PatternElement::AnyOf(set)
                    } else {
                        let allowed = set.complement();
                        if allowed.is_empty() {
                            return Err(PatternError::EmptySet { offset });
                        }
                        PatternElement::NoneOf(set)
                    };
                    tokens.push(PatternToken::once(element));
                    repeated.push(false);
                    i = next;
                }
                '(' => {
                    let Some(last) = tokens.last_mut() else {
                        return Err(PatternError::DanglingRepeat { offset });
                    };
                    let (text, next) = read_until(&chars, i, ')')?;
                    let already_repeated = repeated.last().copied().unwrap_or(false);
                    let (min, max) = parse_repeat(&text)
                        .filter(|_| !already_repeated)
                        .ok_or(PatternError::InvalidRepeat { text, offset })?;
                    last.min = min;
                    last.max = max;
                    if let Some(flag) = repeated.last_mut() {
                        *flag = true;
                    }
                    i = next;
                }
                c if c.is_ascii_alphabetic() => {
                    if residue_index(c as u8).is_none() {
                        return Err(PatternError::UnknownResidue { ch: c, offset });
                    }
                    tokens.push(PatternToken::once(PatternElement::Residue(
                        c.to_ascii_uppercase() as u8,
                    )));
                    repeated.push(false);
                    i += 1;
                }
                _ => return Err(PatternError::UnexpectedChar { ch, offset }),
            }
        }

        if tokens.is_empty() {
            return Err(PatternError::Empty);
        }
        Ok(Self {
            n_terminal,
            c_terminal,
            tokens,
        })
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    pub fn is_n_terminal(&self) -> bool {
        self.n_terminal
    }

    pub fn is_c_terminal(&self) -> bool {
        self.c_terminal
    }

    /// Shortest residue stretch the pattern can match.
    pub fn min_length(&self) -> usize {
        self.tokens.iter().map(|t| t.min).sum()
    }

    /// Regular expression over the 20-letter alphabet.
    pub fn to_regex_string(&self) -> String {
        let mut out = String::new();
        if self.n_terminal {
            out.push('^');
        }
        for token in &self.tokens {
            match token.element {
                PatternElement::Residue(letter) => out.push(letter as char),
                PatternElement::AnyOf(set) => push_class(&mut out, set),
                PatternElement::NoneOf(set) => push_class(&mut out, set.complement()),
                PatternElement::Any => push_class(&mut out, ResidueSet::all()),
            }
            match (token.min, token.max) {
                (1, 1) => {}
                (min, max) if min == max => {
                    let _ = write!(out, "{{{min}}}");
                }
                (min, max) => {
                    let _ = write!(out, "{{{min},{max}}}");
                }
            }
        }
        if self.c_terminal {
            out.push('$');
        }
        out
    }
}

impl PatternToken {
    fn once(element: PatternElement) -> Self {
        Self {
            element,
            min: 1,
            max: 1,
        }
    }
}

fn is_trailer(ch: char) -> bool {
    ch == '.' || ch == '-' || ch.is_whitespace()
}

fn push_class(out: &mut String, set: ResidueSet) {
    if set.len() == 1 {
        out.extend(set.letters().into_iter().map(char::from));
        return;
    }
    out.push('[');
    out.extend(set.letters().into_iter().map(char::from));
    out.push(']');
}

fn read_until(
    chars: &[(usize, char)],
    open_idx: usize,
    close: char,
) -> Result<(String, usize), PatternError> {
    let (offset, open) = chars[open_idx];
    let mut inner = String::new();
    for (idx, (_, ch)) in chars.iter().enumerate().skip(open_idx + 1) {
        if *ch == close {
            return Ok((inner, idx + 1));
        }
        inner.push(*ch);
    }
    Err(PatternError::Unclosed { open, offset })
}

fn read_set(
    chars: &[(usize, char)],
    open_idx: usize,
    close: char,
) -> Result<(ResidueSet, usize), PatternError> {
    let (offset, _) = chars[open_idx];
    let (inner, next) = read_until(chars, open_idx, close)?;
    let mut letters = Vec::with_capacity(inner.len());
    for (pos, ch) in inner.chars().enumerate() {
        if !ch.is_ascii() || residue_index(ch as u8).is_none() {
            return Err(PatternError::UnknownResidue {
                ch,
                offset: offset + 1 + pos,
            });
        }
        letters.push(ch as u8);
    }
    let set = ResidueSet::from_letters(&letters).map_err(|b| PatternError::UnknownResidue {
        ch: b as char,
        offset,
    })?;
    if set.is_empty() {
        return Err(PatternError::EmptySet { offset });
    }
    Ok((set, next))
}

fn parse_repeat(text: &str) -> Option<(usize, usize)> {
    let (min, max) = match text.split_once(',') {
        Some((min, max)) => (
            min.trim().parse::<usize>().ok()?,
            max.trim().parse::<usize>().ok()?,
        ),
        None => {
            let n = text.trim().parse::<usize>().ok()?;
            (n, n)
        }
    };
    if max == 0 || min > max {
        return None;
    }
    Some((min, max))
}

/// A position pattern with its compiled matcher.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    pattern: PositionPattern,
    regex: Regex,
}

impl CompiledPattern {
    pub fn compile(text: &str) -> Result<Self, PatternError> {
        let pattern = PositionPattern::parse(text)?;
        let regex = RegexBuilder::new(&pattern.to_regex_string())
            .case_insensitive(true)
            .build()
            .map_err(|e| PatternError::Regex(e.to_string()))?;
        Ok(Self {
            source: text.trim().to_string(),
            pattern,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pattern(&self) -> &PositionPattern {
        &self.pattern
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Every leftmost, non-overlapping hit in `residues`, as 1-based spans.
    pub fn find_spans(&self, residues: &str) -> Vec<Span> {
        let len = residues.len();
        self.regex
            .find_iter(residues)
            .filter_map(|m| Span::from_offset(m.start(), m.len(), len))
            .collect()
    }
}
