//! Fixed-width bitset over item indices.
//!
//! Item indices are small integers defined per kind; index 0 is reserved as
//! "unknown" and is never set. 192 bits covers every kind this crate ships
//! with room to spare.

/// Highest item index a query can hold.
pub const ITEM_MAX: usize = 191;

const WORDS: usize = 3;

/// Set of requested item indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Query([u64; WORDS]);

impl Query {
    pub fn new() -> Self {
        Query([0; WORDS])
    }

    pub fn from_items(items: &[usize]) -> Self {
        let mut q = Query::new();
        for &item in items {
            q.set(item);
        }
        q
    }

    #[inline]
    pub fn test(&self, item: usize) -> bool {
        debug_assert!(item <= ITEM_MAX);
        self.0[item / 64] & (1u64 << (item % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, item: usize) {
        debug_assert!(item <= ITEM_MAX);
        self.0[item / 64] |= 1u64 << (item % 64);
    }

    #[inline]
    pub fn clear(&mut self, item: usize) {
        debug_assert!(item <= ITEM_MAX);
        self.0[item / 64] &= !(1u64 << (item % 64));
    }

    pub fn reset(&mut self) {
        self.0 = [0; WORDS];
    }

    /// In-place union.
    pub fn add(&mut self, other: &Query) {
        for (w, o) in self.0.iter_mut().zip(other.0.iter()) {
            *w |= o;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Iterate over set item indices, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (1..=ITEM_MAX).filter(move |&i| self.test(i))
    }
}
