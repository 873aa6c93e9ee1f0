//! Per-type indexing configuration, mutated by the `search-index-config` hook before a
//! content type is fetched and normalized.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default cron expression for the recurring reindex task, overridden by the
/// `index-frequency` setting.
pub const DEFAULT_INDEX_FREQUENCY: &str = "0 0 * * *";

/// Defaults to indexing every row of a type with its rich-text fields prefetched and
/// normalized; plugins veto either step for types they handle themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub content_type: String,
    #[serde(default = "default_true")]
    pub should_index: bool,
    #[serde(default = "default_true")]
    pub prefetch_items: bool,
    #[serde(default)]
    pub fields: Value,
}

fn default_true() -> bool {
    true
}

impl IndexConfig {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            should_index: true,
            prefetch_items: true,
            fields: Value::Null,
        }
    }
}
