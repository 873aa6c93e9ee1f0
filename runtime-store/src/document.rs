//! Data-store trigger interception.
//!
//! The document database itself is an external collaborator (`DocumentStore`); this
//! module wraps it so every `save`/`destroy` fires the full before/after hook chain
//! before and after the real operation runs, exactly as a persistence-layer interceptor
//! would in the system this is modeled on.

use std::sync::Arc;

use async_trait::async_trait;
use runtime_core::{HookContext, HookEngine};
use serde_json::Value;

/// A saveable/destroyable row. `class_name` drives the `-<ClassName>` hook variant and
/// the `content_`-prefix rule that additionally fires the `-content` variant.
#[derive(Debug, Clone)]
pub struct StoreObject {
    pub class_name: String,
    pub id: Option<String>,
    pub data: Value,
}

impl StoreObject {
    pub fn new(class_name: impl Into<String>, data: Value) -> Self {
        Self {
            class_name: class_name.into(),
            id: None,
            data,
        }
    }

    fn is_content_class(&self) -> bool {
        self.class_name.starts_with("content_")
    }
}

/// The external document database collaborator. Implementations own the actual
/// persistence; this crate only ever sees it through this trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn persist(&self, object: &StoreObject) -> anyhow::Result<StoreObject>;
    async fn remove(&self, object: &StoreObject) -> anyhow::Result<()>;
    /// Looks up a row by class and id without triggering any hook chain. Returns `None`
    /// when no such row exists.
    async fn find(&self, class_name: &str, id: &str) -> anyhow::Result<Option<Value>>;
    /// Fetches every row of `class_name`, used by the search indexer's prefetch step.
    async fn list(&self, class_name: &str) -> anyhow::Result<Vec<Value>>;
}

/// In-memory `DocumentStore` used by tests and as the fallback when no real database
/// client is wired in.
#[derive(Default)]
pub struct InMemoryStore {
    rows: parking_lot::RwLock<std::collections::HashMap<(String, String), Value>>,
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn persist(&self, object: &StoreObject) -> anyhow::Result<StoreObject> {
        let id = object
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut saved = object.clone();
        saved.id = Some(id.clone());
        self.rows
            .write()
            .insert((object.class_name.clone(), id), saved.data.clone());
        Ok(saved)
    }

    async fn remove(&self, object: &StoreObject) -> anyhow::Result<()> {
        if let Some(id) = &object.id {
            self.rows.write().remove(&(object.class_name.clone(), id.clone()));
        }
        Ok(())
    }

    async fn find(&self, class_name: &str, id: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.rows.read().get(&(class_name.to_string(), id.to_string())).cloned())
    }

    async fn list(&self, class_name: &str) -> anyhow::Result<Vec<Value>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|((class, _), _)| class == class_name)
            .map(|(_, v)| v.clone())
            .collect())
    }
}

/// Wraps a [`DocumentStore`] so `save`/`destroy` dispatch the full before/after hook
/// chain through the given [`HookEngine`].
pub struct TriggerInterceptor {
    store: Arc<dyn DocumentStore>,
    hooks: Arc<HookEngine>,
}

impl TriggerInterceptor {
    pub fn new(store: Arc<dyn DocumentStore>, hooks: Arc<HookEngine>) -> Self {
        Self { store, hooks }
    }

    /// Fires `before-save` → `before-save-<ClassName>` → (content classes only)
    /// `before-save-content`, performs the real save, then fires the symmetric
    /// `after-save` chain. Each step is a distinct hook name, not a domain filter on a
    /// shared one, so a generic listener fires exactly once per operation regardless of
    /// how many class-scoped variants also run.
    pub async fn save(&self, object: StoreObject) -> anyhow::Result<StoreObject> {
        let class = object.class_name.clone();
        let is_content = object.is_content_class();
        let ctx = HookContext::with_data(object.data.clone());

        let ctx = self.hooks.run("before-save", ctx).await;
        let ctx = self.hooks.run(&format!("before-save-{class}"), ctx).await;
        let ctx = if is_content {
            self.hooks.run("before-save-content", ctx).await
        } else {
            ctx
        };

        let mut to_save = object;
        to_save.data = ctx.data;
        let saved = self.store.persist(&to_save).await?;

        let ctx = HookContext::with_data(saved.data.clone());
        let ctx = self.hooks.run("after-save", ctx).await;
        let ctx = self.hooks.run(&format!("after-save-{class}"), ctx).await;
        if is_content {
            self.hooks.run("after-save-content", ctx).await;
        }

        Ok(saved)
    }

    /// Fires `before-delete` → `before-delete-<ClassName>` → (content classes only)
    /// `before-delete-content`, performs the real delete, then fires the symmetric
    /// `after-delete` chain.
    pub async fn destroy(&self, object: StoreObject) -> anyhow::Result<()> {
        let class = object.class_name.clone();
        let is_content = object.is_content_class();
        let ctx = HookContext::with_data(object.data.clone());

        let ctx = self.hooks.run("before-delete", ctx).await;
        let ctx = self.hooks.run(&format!("before-delete-{class}"), ctx).await;
        if is_content {
            self.hooks.run("before-delete-content", ctx).await;
        }

        self.store.remove(&object).await?;

        let ctx = HookContext::with_data(object.data.clone());
        let ctx = self.hooks.run("after-delete", ctx).await;
        let ctx = self.hooks.run(&format!("after-delete-{class}"), ctx).await;
        if is_content {
            self.hooks.run("after-delete-content", ctx).await;
        }

        Ok(())
    }
}
