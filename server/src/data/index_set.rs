//! Index set registry
//!
//! Maps index set ids to the Doris table the chart queries run against.
//! Populated from the `index_sets` config section at startup and read-only
//! afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A log source that can be charted
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexSet {
    pub index_set_id: u64,
    #[serde(default)]
    pub index_set_name: String,
    /// Doris result table backing this index set
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub support_doris: bool,
    pub bk_biz_id: i64,
}

impl IndexSet {
    /// The Doris table to query, if this index set can be queried with SQL
    pub fn doris_table(&self) -> Option<&str> {
        if !self.support_doris {
            return None;
        }
        self.table_id.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Default)]
pub struct IndexSetRegistry {
    index_sets: HashMap<u64, IndexSet>,
}

impl IndexSetRegistry {
    pub fn new(index_sets: impl IntoIterator<Item = IndexSet>) -> Self {
        let mut map = HashMap::new();
        for index_set in index_sets {
            if let Some(previous) = map.insert(index_set.index_set_id, index_set) {
                tracing::warn!(
                    index_set_id = previous.index_set_id,
                    "Duplicate index set id in config, keeping the last entry"
                );
            }
        }
        tracing::debug!(count = map.len(), "Index set registry loaded");
        Self { index_sets: map }
    }

    pub fn get(&self, index_set_id: u64) -> Option<&IndexSet> {
        self.index_sets.get(&index_set_id)
    }

    pub fn len(&self) -> usize {
        self.index_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_sets.is_empty()
    }
}
