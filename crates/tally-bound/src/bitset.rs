//! Small dense bit-set.
//!
//! Used for per-child inversion flags of variadic nodes and for the sets of
//! scope-stack positions a subtree references. Trailing zero words are never
//! stored, so structurally equal sets compare equal.

use std::fmt;

use smallvec::SmallVec;

const WORD_BITS: usize = 64;

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: SmallVec<[u64; 2]>,
}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (bit % WORD_BITS);
    }

    pub fn remove(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << (bit % WORD_BITS));
            self.trim();
        }
    }

    pub fn set(&mut self, bit: usize, value: bool) {
        if value {
            self.insert(bit);
        } else {
            self.remove(bit);
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.words
            .get(bit / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (bit % WORD_BITS)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Highest set bit.
    pub fn max(&self) -> Option<usize> {
        let last = self.words.last()?;
        Some((self.words.len() - 1) * WORD_BITS + (WORD_BITS - 1 - last.leading_zeros() as usize))
    }

    /// Whether any bit at or above `start` is set.
    pub fn any_from(&self, start: usize) -> bool {
        self.max().is_some_and(|m| m >= start)
    }

    /// Clear every bit at or above `start`.
    pub fn clear_from(&mut self, start: usize) {
        let word = start / WORD_BITS;
        if word >= self.words.len() {
            return;
        }
        self.words.truncate(word + 1);
        let keep = start % WORD_BITS;
        self.words[word] &= if keep == 0 { 0 } else { u64::MAX >> (WORD_BITS - keep) };
        self.trim();
    }

    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..WORD_BITS)
                .filter(move |b| word & (1u64 << b) != 0)
                .map(move |b| i * WORD_BITS + b)
        })
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::new();
        for bit in iter {
            set.insert(bit);
        }
        set
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
