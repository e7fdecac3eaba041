/// A fixed-width bit vector backed by `WORDS` 64-bit words (capacity `WORDS * 64` bits).
///
/// Mirrors the flat bit arrays used for `pubs_isrel`, `rsubs`, `pubs_to_declare` and
/// `subs_to_declare`: fixed capacity, `O(1)` indexing, no growth. Callers needing `N`
/// bits pick `WORDS = N.div_ceil(64)`; the remaining bits up to `WORDS * 64` are simply
/// never indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitSet<const WORDS: usize> {
    words: [u64; WORDS],
}

impl<const WORDS: usize> BitSet<WORDS> {
    pub const CAPACITY: usize = WORDS * 64;

    #[inline]
    pub const fn new() -> Self {
        Self { words: [0u64; WORDS] }
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        assert!(idx < Self::CAPACITY, "bitset index out of range");
        self.words[idx / 64] |= 1u64 << (idx % 64);
    }

    #[inline]
    pub fn clear(&mut self, idx: usize) {
        assert!(idx < Self::CAPACITY, "bitset index out of range");
        self.words[idx / 64] &= !(1u64 << (idx % 64));
    }

    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        assert!(idx < Self::CAPACITY, "bitset index out of range");
        (self.words[idx / 64] >> (idx % 64)) & 1 != 0
    }

    #[inline]
    pub fn clear_all(&mut self) {
        self.words = [0u64; WORDS];
    }

    #[inline]
    pub fn is_all_clear(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Index of the lowest set bit, or `None` if nothing is set.
    #[inline]
    pub fn find_first(&self) -> Option<usize> {
        for (wi, &w) in self.words.iter().enumerate() {
            if w != 0 {
                return Some(wi * 64 + w.trailing_zeros() as usize);
            }
        }
        None
    }

    /// Bitwise OR `other` into `self` — the commit-time merge used by the declare
    /// transaction pipeline (`rsubs |= precommit_rsubs`).
    #[inline]
    pub fn or_assign(&mut self, other: &Self) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }
}

impl<const WORDS: usize> Default for BitSet<WORDS> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Number of 64-bit words needed to hold `n` bits.
#[inline]
pub const fn words_for(n: usize) -> usize {
    n.div_ceil(64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_test() {
        let mut b: BitSet<2> = BitSet::new();
        assert!(b.is_all_clear());
        b.set(0);
        b.set(63);
        b.set(64);
        b.set(69);
        assert!(b.test(0));
        assert!(b.test(63));
        assert!(b.test(64));
        assert!(b.test(69));
        assert!(!b.test(1));
        b.clear(63);
        assert!(!b.test(63));
    }

    #[test]
    fn find_first_empty_and_full() {
        let b: BitSet<2> = BitSet::new();
        assert_eq!(b.find_first(), None);

        let mut full: BitSet<1> = BitSet::new();
        full.set(0);
        full.set(1);
        full.set(2);
        assert_eq!(full.find_first(), Some(0));
        full.clear(0);
        assert_eq!(full.find_first(), Some(1));
    }

    #[test]
    fn or_assign_merges() {
        let mut a: BitSet<1> = BitSet::new();
        let mut b: BitSet<1> = BitSet::new();
        a.set(1);
        b.set(2);
        a.or_assign(&b);
        assert!(a.test(1));
        assert!(a.test(2));
    }

    #[test]
    #[should_panic]
    fn out_of_range_panics() {
        let b: BitSet<1> = BitSet::new();
        b.test(64);
    }

    #[test]
    fn words_for_rounds_up() {
        assert_eq!(words_for(0), 0);
        assert_eq!(words_for(1), 1);
        assert_eq!(words_for(64), 1);
        assert_eq!(words_for(65), 2);
    }
}
