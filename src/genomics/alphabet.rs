/// Base alphabet used for counting.
///
/// Symbols are matched case-insensitively; `U` is folded onto `T` when the
/// alphabet contains `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseConfig {
    bases: Vec<u8>,
    lookup: [Option<u8>; 256],
}

impl BaseConfig {
    /// Build an alphabet from the provided symbols.
    pub fn new(bases: &[u8]) -> Self {
        let bases: Vec<u8> = bases.iter().map(|b| b.to_ascii_uppercase()).collect();
        let mut lookup = [None; 256];
        for (idx, &base) in bases.iter().enumerate() {
            lookup[base as usize] = Some(idx as u8);
            lookup[base.to_ascii_lowercase() as usize] = Some(idx as u8);
        }
        if let Some(t) = lookup[b'T' as usize] {
            lookup[b'U' as usize].get_or_insert(t);
            lookup[b'u' as usize].get_or_insert(t);
        }
        Self { bases, lookup }
    }

    /// Index of `base` within the alphabet.
    #[inline]
    pub fn index_of(&self, base: u8) -> Option<usize> {
        self.lookup[base as usize].map(usize::from)
    }

    /// Symbol stored at `idx`.
    pub fn symbol(&self, idx: usize) -> u8 {
        self.bases[idx]
    }

    /// All symbols in index order.
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Whether the alphabet is empty.
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Every base index, the default subset used by the statistic.
    pub fn all_indices(&self) -> Vec<usize> {
        (0..self.bases.len()).collect()
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self::new(b"ACGT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alphabet_maps_nucleotides() {
        let config = BaseConfig::default();
        assert_eq!(config.len(), 4);
        assert_eq!(config.index_of(b'A'), Some(0));
        assert_eq!(config.index_of(b'g'), Some(2));
        assert_eq!(config.index_of(b'U'), Some(3));
        assert_eq!(config.index_of(b'N'), None);
        assert_eq!(config.symbol(1), b'C');
    }
}
