//! Lazy deletion set
//!
//! Deleted vector ids are recorded in a bitset instead of being removed from
//! posting lists, so block offsets and cursors stay valid. Entries are only
//! reclaimed when the next compaction rebuilds the immutable index.

use crate::VectorId;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tombstones {
    words: Vec<u64>,
    count: usize,
}

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn slot(id: VectorId) -> (usize, u64) {
        let id = id as usize;
        (id / 64, 1u64 << (id % 64))
    }

    /// Whether `id` has been deleted
    #[inline]
    pub fn is_dead(&self, id: VectorId) -> bool {
        let (word, mask) = Self::slot(id);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    #[inline]
    pub fn is_live(&self, id: VectorId) -> bool {
        !self.is_dead(id)
    }

    /// Make room to mark `id` later without allocating
    pub fn try_reserve(&mut self, id: VectorId) -> Result<()> {
        let (word, _) = Self::slot(id);
        if word >= self.words.len() {
            self.words.try_reserve(word + 1 - self.words.len())?;
            self.words.resize(word + 1, 0);
        }
        Ok(())
    }

    /// Mark `id` dead. Returns false if it was already dead.
    ///
    /// Only allocates when `id` lies beyond the last reserved word.
    pub fn mark(&mut self, id: VectorId) -> Result<bool> {
        self.try_reserve(id)?;
        let (word, mask) = Self::slot(id);
        if self.words[word] & mask != 0 {
            return Ok(false);
        }
        self.words[word] |= mask;
        self.count += 1;
        Ok(true)
    }

    /// Copy of the set with room to mark `id`, failing instead of aborting
    pub fn try_clone_for(&self, id: VectorId) -> Result<Self> {
        let (word, _) = Self::slot(id);
        let mut words = Vec::new();
        words.try_reserve_exact(self.words.len().max(word + 1))?;
        words.extend_from_slice(&self.words);
        let mut copy = Self {
            words,
            count: self.count,
        };
        // Within capacity, so this cannot allocate
        copy.try_reserve(id)?;
        Ok(copy)
    }

    /// Number of dead ids below `limit`
    pub fn count_below(&self, limit: usize) -> usize {
        if self.words.len() * 64 <= limit {
            return self.count;
        }
        let full = limit / 64;
        let mut dead: usize = self.words[..full]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum();
        let rest = limit % 64;
        if rest > 0 {
            dead += (self.words[full] & ((1u64 << rest) - 1)).count_ones() as usize;
        }
        dead
    }

    /// Number of dead ids
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Dead ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &bits)| {
            (0..64u32)
                .filter(move |b| bits & (1u64 << b) != 0)
                .map(move |b| (w as u32) * 64 + b)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_query() {
        let mut t = Tombstones::new();
        assert!(t.is_live(5));
        assert!(t.mark(5).unwrap());
        assert!(!t.mark(5).unwrap());
        assert!(t.mark(200).unwrap());
        assert!(t.is_dead(5));
        assert!(t.is_dead(200));
        assert!(t.is_live(6));
        assert!(t.is_live(10_000));
        assert_eq!(t.len(), 2);
        assert_eq!(t.iter().collect::<Vec<_>>(), vec![5, 200]);
    }

    #[test]
    fn test_count_below() {
        let mut t = Tombstones::new();
        for id in [0, 63, 64, 130, 200] {
            t.mark(id).unwrap();
        }
        assert_eq!(t.count_below(0), 0);
        assert_eq!(t.count_below(63), 1);
        assert_eq!(t.count_below(64), 2);
        assert_eq!(t.count_below(65), 3);
        assert_eq!(t.count_below(131), 4);
        assert_eq!(t.count_below(10_000), 5);
        for limit in 0..260 {
            let expected = t.iter().take_while(|&id| (id as usize) < limit).count();
            assert_eq!(t.count_below(limit), expected, "limit {}", limit);
        }
    }

    #[test]
    fn test_try_clone_for() {
        let mut t = Tombstones::new();
        t.mark(3).unwrap();

        let mut copy = t.try_clone_for(500).unwrap();
        assert_eq!(copy, {
            let mut grown = t.clone();
            grown.try_reserve(500).unwrap();
            grown
        });
        let capacity = copy.words.capacity();
        assert!(copy.mark(500).unwrap());
        assert_eq!(copy.words.capacity(), capacity);
        assert_eq!(copy.len(), 2);
        assert!(t.is_live(500));
        assert_eq!(t.len(), 1);
    }
}
