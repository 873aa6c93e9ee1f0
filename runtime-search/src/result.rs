//! Result shapes shared by the index and search operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single scored search hit. `fields` carries whatever the indexer plugin populated;
/// `score` is the only field the coordinator itself inspects (for threshold filtering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f64,
    #[serde(flatten)]
    pub fields: Value,
}

/// Paginated search response. Populated by plugins through `context.results` during the
/// `search` hook, then threshold-filtered by the coordinator before being returned.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResults {
    pub count: usize,
    pub page: usize,
    pub pages: usize,
    pub next: Option<usize>,
    pub prev: Option<usize>,
    pub results: Vec<SearchHit>,
}

impl SearchResults {
    /// Recomputes `count`/`pages`/`next`/`prev` from the current `results` and the
    /// requested `page`/`limit`, as the final step after threshold filtering drops hits.
    pub fn paginate(mut self, page: usize, limit: usize) -> Self {
        self.count = self.results.len();
        self.pages = if limit == 0 { 1 } else { self.count.div_ceil(limit).max(1) };
        self.page = page;
        self.next = if page + 1 < self.pages { Some(page + 1) } else { None };
        self.prev = if page > 0 { Some(page - 1) } else { None };
        self
    }
}
