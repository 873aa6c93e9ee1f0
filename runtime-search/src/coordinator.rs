//! The search index coordinator: runs content types through the index pipeline on a
//! schedule, and hands search requests to whichever indexer plugin has registered for
//! `search`.

use std::sync::Arc;

use runtime_core::{HookContext, HookEngine};
use runtime_store::document::DocumentStore;
use runtime_tasks::Scheduler;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::{IndexConfig, DEFAULT_INDEX_FREQUENCY};
use crate::normalize::extract_plaintext;
use crate::result::{SearchHit, SearchResults};

const REINDEX_TASK_ID: &str = "content-search-indexing";

pub struct SearchCoordinator {
    hooks: Arc<HookEngine>,
    store: Arc<dyn DocumentStore>,
    scheduler: Arc<Scheduler>,
}

impl SearchCoordinator {
    pub fn new(hooks: Arc<HookEngine>, store: Arc<dyn DocumentStore>, scheduler: Arc<Scheduler>) -> Self {
        Self { hooks, store, scheduler }
    }

    /// Runs one content type through `search-index-config` (generic, then the
    /// `-<content_type>` variant) → prefetch+normalize → `search-index` (generic, then
    /// the `-<content_type>` variant). Mirrors the three-stage pipeline verbatim: a
    /// plugin opting a type out at the config stage skips prefetch entirely.
    pub async fn index(&self, content_type: &str) -> IndexConfig {
        let config = IndexConfig::new(content_type);
        let ctx = HookContext::with_data(serde_json::to_value(&config).unwrap_or(Value::Null));
        let ctx = self.hooks.run("search-index-config", ctx).await;
        let ctx = self
            .hooks
            .run(&format!("search-index-config-{content_type}"), ctx)
            .await;

        let config: IndexConfig = serde_json::from_value(ctx.data).unwrap_or(config);
        if !config.should_index {
            return config;
        }

        let items = if config.prefetch_items {
            self.prefetch_and_normalize(&config).await
        } else {
            Vec::new()
        };

        let payload = json!({
            "items": items,
            "type": config.content_type,
            "permittedFields": config.fields,
            "indexConfig": config,
        });
        let ctx = HookContext::with_data(payload);
        let ctx = self.hooks.run("search-index", ctx).await;
        self.hooks.run(&format!("search-index-{content_type}"), ctx).await;

        config
    }

    async fn prefetch_and_normalize(&self, config: &IndexConfig) -> Vec<Value> {
        let rows = match self.store.list(&config.content_type).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(content_type = %config.content_type, error = %err, "search index prefetch failed");
                return Vec::new();
            }
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let plaintext = extract_plaintext(&row);
            let payload = json!({
                "item": row,
                "type": config.content_type,
                "permittedFields": config.fields,
                "indexConfig": config,
                "plaintext": plaintext,
            });
            let ctx = HookContext::with_data(payload);
            let ctx = self.hooks.run("search-index-item-normalize", ctx).await;
            let ctx = self
                .hooks
                .run(&format!("search-index-item-normalize-{}", config.content_type), ctx)
                .await;
            items.push(ctx.data);
        }
        items
    }

    /// Fires the `search` hook so an indexer plugin can populate `context.results`, then
    /// threshold-filters the hits and recomputes pagination.
    pub async fn search(&self, index: &str, query: &str, page: usize, limit: usize, threshold: f64) -> SearchResults {
        let request = json!({
            "index": index,
            "search": query,
            "page": page,
            "limit": limit,
            "threshold": threshold,
        });
        let ctx = HookContext::with_data(request);
        let ctx = self.hooks.run("search", ctx).await;

        let results: SearchResults = ctx
            .result
            .and_then(|r| serde_json::from_value(r).ok())
            .unwrap_or_default();

        let filtered: Vec<SearchHit> = results.results.into_iter().filter(|hit| hit.score >= threshold).collect();

        SearchResults {
            results: filtered,
            ..SearchResults::default()
        }
        .paginate(page, limit)
    }

    /// Indexes every content type once, then schedules the recurring reindex task under
    /// the cron expression named by `index_frequency` (the `index-frequency` setting).
    pub async fn start(&self, content_types: &[String], index_frequency: Option<&str>) {
        for content_type in content_types {
            self.index(content_type).await;
        }
        self.reschedule(content_types.to_vec(), index_frequency.unwrap_or(DEFAULT_INDEX_FREQUENCY));
    }

    /// Rewrites the recurring reindex task's cron schedule. Called at boot and again by
    /// the `setting-set` hook whenever `index-frequency` changes.
    pub fn reschedule(&self, content_types: Vec<String>, cron_expression: &str) {
        self.scheduler.unregister(REINDEX_TASK_ID);
        let hooks = self.hooks.clone();
        let store = self.store.clone();
        let scheduler = self.scheduler.clone();
        let callback: runtime_tasks::TaskCallback = Arc::new(move || {
            let hooks = hooks.clone();
            let store = store.clone();
            let scheduler = scheduler.clone();
            let content_types = content_types.clone();
            Box::pin(async move {
                let coordinator = SearchCoordinator::new(hooks, store, scheduler);
                for content_type in &content_types {
                    coordinator.index(content_type).await;
                }
                Ok(())
            })
        });
        if let Err(err) = self.scheduler.register_cron(REINDEX_TASK_ID, cron_expression, callback) {
            warn!(error = %err, "failed to schedule content search reindex task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_core::Priority;
    use runtime_store::document::{InMemoryStore, StoreObject};

    fn harness() -> (Arc<HookEngine>, Arc<dyn DocumentStore>, Arc<Scheduler>) {
        (
            Arc::new(HookEngine::new()),
            Arc::new(InMemoryStore::default()),
            Arc::new(Scheduler::new()),
        )
    }

    #[tokio::test]
    async fn index_skips_prefetch_when_plugin_sets_should_index_false() {
        let (hooks, store, scheduler) = harness();
        hooks.register("search-index-config-article", runtime_core::DEFAULT_DOMAIN, Priority::Neutral, |mut ctx| async move {
            if let Some(obj) = ctx.data.as_object_mut() {
                obj.insert("shouldIndex".to_string(), json!(false));
            }
            (ctx, Ok(()))
        });

        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let f = fired.clone();
        hooks.register("search-index-item-normalize", runtime_core::DEFAULT_DOMAIN, Priority::Neutral, move |ctx| {
            let f = f.clone();
            async move {
                f.store(true, std::sync::atomic::Ordering::SeqCst);
                (ctx, Ok(()))
            }
        });

        let coordinator = SearchCoordinator::new(hooks, store, scheduler);
        let config = coordinator.index("article").await;

        assert!(!config.should_index);
        assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn index_prefetches_and_normalizes_every_row_of_the_type() {
        let (hooks, store, scheduler) = harness();
        store
            .persist(&StoreObject {
                class_name: "article".to_string(),
                id: Some("a1".to_string()),
                data: json!({"body": [{"children": [{"text": "hello"}]}]}),
            })
            .await
            .unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = seen.clone();
        hooks.register("search-index-item-normalize-article", runtime_core::DEFAULT_DOMAIN, Priority::Neutral, move |ctx| {
            let s = s.clone();
            async move {
                s.lock().push(ctx.data.clone());
                (ctx, Ok(()))
            }
        });

        let coordinator = SearchCoordinator::new(hooks, store, scheduler);
        coordinator.index("article").await;

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0]["plaintext"], json!("hello"));
    }

    #[tokio::test]
    async fn search_filters_hits_below_threshold_and_recomputes_pagination() {
        let (hooks, store, scheduler) = harness();
        hooks.register("search", runtime_core::DEFAULT_DOMAIN, Priority::Neutral, |mut ctx| async move {
            ctx.result = Some(json!({
                "results": [
                    {"score": 0.9, "title": "match"},
                    {"score": 0.1, "title": "weak"},
                ]
            }));
            (ctx, Ok(()))
        });

        let coordinator = SearchCoordinator::new(hooks, store, scheduler);
        let results = coordinator.search("articles", "hello", 0, 10, 0.5).await;

        assert_eq!(results.count, 1);
        assert_eq!(results.results[0].score, 0.9);
    }
}
