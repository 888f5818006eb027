//! Index configuration

use serde::{Deserialize, Serialize};

use crate::structures::{BLOCK_SIZE, MIN_BLOCK_SIZE};

/// What the immutable path does once its snapshot is too far behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Answer from the stale snapshot, honoring current deletes
    Serve,
    /// Answer from the mutable index
    #[default]
    Fallback,
    /// Rebuild the snapshot, then answer from it
    Recompact,
}

/// What a query against an index with no live vectors returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyIndexPolicy {
    #[default]
    ReturnEmpty,
    Error,
}

/// Index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Entries per block in the immutable index (clamped to at least 16)
    pub block_size: usize,
    /// Inserts the snapshot may lag behind before it counts as stale
    /// (None = never stale). Deletes always reach the snapshot.
    pub max_pending_inserts: Option<usize>,
    pub stale_policy: StalePolicy,
    pub empty_index: EmptyIndexPolicy,
    /// Threads for compaction (0 = rayon's global pool)
    pub num_threads: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            max_pending_inserts: Some(0),
            stale_policy: StalePolicy::default(),
            empty_index: EmptyIndexPolicy::default(),
            num_threads: 0,
        }
    }
}

impl IndexConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_max_pending_inserts(mut self, max: usize) -> Self {
        self.max_pending_inserts = Some(max);
        self
    }

    /// Never treat the snapshot as stale, whatever was inserted since
    pub fn without_staleness_limit(mut self) -> Self {
        self.max_pending_inserts = None;
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_empty_index_policy(mut self, policy: EmptyIndexPolicy) -> Self {
        self.empty_index = policy;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Block size actually used by the builder
    pub fn effective_block_size(&self) -> usize {
        self.block_size.max(MIN_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.block_size, 128);
        assert_eq!(config.max_pending_inserts, Some(0));
        assert_eq!(config.stale_policy, StalePolicy::Fallback);
        assert_eq!(config.empty_index, EmptyIndexPolicy::ReturnEmpty);
        assert_eq!(IndexConfig::default().with_block_size(4).effective_block_size(), 16);
    }

    #[test]
    fn test_partial_json() {
        let config: IndexConfig =
            serde_json::from_str(r#"{"block_size": 64, "stale_policy": "recompact"}"#).unwrap();
        assert_eq!(config.block_size, 64);
        assert_eq!(config.stale_policy, StalePolicy::Recompact);
        assert_eq!(config.num_threads, 0);

        assert_eq!(config.max_pending_inserts, Some(0));

        let json = serde_json::to_string(&config.clone().with_max_pending_inserts(10)).unwrap();
        let back: IndexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_pending_inserts, Some(10));
        assert_eq!(back.block_size, 64);

        let never: IndexConfig = serde_json::from_str(r#"{"max_pending_inserts": null}"#).unwrap();
        assert_eq!(never, IndexConfig::default().without_staleness_limit());
    }
}
