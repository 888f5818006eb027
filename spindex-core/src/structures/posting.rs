//! Mutable posting list for one dimension
//!
//! Entries are appended in insertion order. Vector ids are assigned
//! monotonically, so the list is also sorted by id. Deleted ids stay in the
//! list and are filtered against [`Tombstones`](super::Tombstones) at read time.

use crate::VectorId;
use crate::error::Result;

/// A posting entry: vector id with its weight for the list's dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostingEntry {
    pub id: VectorId,
    pub weight: f32,
}

#[derive(Debug, Clone, Default)]
pub struct PostingList {
    entries: Vec<PostingEntry>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty list with room for `capacity` entries, failing instead of aborting
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve(capacity)?;
        Ok(Self { entries })
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.entries.try_reserve(additional)?;
        Ok(())
    }

    /// Append an entry (must be added in id order)
    pub fn push(&mut self, id: VectorId, weight: f32) {
        debug_assert!(
            self.entries.last().is_none_or(|last| last.id < id),
            "Postings must be added in id order"
        );
        self.entries.push(PostingEntry { id, weight });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostingEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[PostingEntry] {
        &self.entries
    }

    /// Largest weight in the list (0.0 when empty)
    pub fn max_weight(&self) -> f32 {
        self.entries.iter().map(|e| e.weight).fold(0.0f32, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_iterate() {
        let mut list = PostingList::try_with_capacity(4).unwrap();
        list.push(1, 0.5);
        list.push(4, 2.0);
        list.push(9, 1.0);

        assert_eq!(list.len(), 3);
        let ids: Vec<_> = list.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 4, 9]);
        assert_eq!(list.max_weight(), 2.0);
        assert_eq!(PostingList::new().max_weight(), 0.0);
    }
}
