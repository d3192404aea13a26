/// The 20 canonical amino acids, in alphabetical one-letter order.
pub const AMINO_ACID_ALPHABET: &[u8; 20] = b"ACDEFGHIKLMNPQRSTVWY";

pub const AMINO_ACID_COUNT: usize = AMINO_ACID_ALPHABET.len();

/// Position of a residue in [`AMINO_ACID_ALPHABET`], case-insensitive.
#[inline(always)]
pub fn residue_index(letter: u8) -> Option<usize> {
    match letter.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'D' => Some(2),
        b'E' => Some(3),
        b'F' => Some(4),
        b'G' => Some(5),
        b'H' => Some(6),
        b'I' => Some(7),
        b'K' => Some(8),
        b'L' => Some(9),
        b'M' => Some(10),
        b'N' => Some(11),
        b'P' => Some(12),
        b'Q' => Some(13),
        b'R' => Some(14),
        b'S' => Some(15),
        b'T' => Some(16),
        b'V' => Some(17),
        b'W' => Some(18),
        b'Y' => Some(19),
        _ => None,
    }
}

#[inline(always)]
pub fn is_canonical_residue(letter: u8) -> bool {
    residue_index(letter).is_some()
}

/// A set of residues as a 20-bit mask over [`AMINO_ACID_ALPHABET`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResidueSet(u32);

impl ResidueSet {
    const ALL_BITS: u32 = (1 << AMINO_ACID_COUNT) - 1;

    pub fn all() -> Self {
        Self(Self::ALL_BITS)
    }

    /// Builds a set from letters; returns the first non-canonical letter on failure.
    pub fn from_letters(letters: &[u8]) -> Result<Self, u8> {
        let mut bits = 0;
        for &letter in letters {
            let idx = residue_index(letter).ok_or(letter)?;
            bits |= 1 << idx;
        }
        Ok(Self(bits))
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn contains(&self, letter: u8) -> bool {
        residue_index(letter).is_some_and(|idx| self.0 & (1 << idx) != 0)
    }

    pub fn complement(self) -> Self {
        Self(!self.0 & Self::ALL_BITS)
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Upper-case letters in alphabet order.
    pub fn letters(&self) -> Vec<u8> {
        AMINO_ACID_ALPHABET
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.0 & (1 << idx) != 0)
            .map(|(_, letter)| *letter)
            .collect()
    }
}
