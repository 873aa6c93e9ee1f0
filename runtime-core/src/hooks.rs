//! The hook engine: a named, priority-ordered dispatch bus that every extension point in
//! the runtime (lifecycle events, storage triggers, middleware, search indexing) fires
//! through instead of calling collaborators directly.
//!
//! `run(name, ...)` dispatches purely by `name`. `domain` is registration-only metadata —
//! it tags a callback for later bulk removal via [`HookEngine::unregister_domain`] but
//! plays no part in which callbacks a given `run` fires. Callers that want a
//! class-scoped variant of a hook (`before-save-Article`) register and run under that
//! distinct name, not under a domain filter on the shared name. Dispatch runs callbacks
//! sequentially in ascending `(order, insertion_seq)` order: lower `order` first, ties
//! broken by registration order. Async failures are logged and swallowed so one
//! misbehaving callback cannot wedge a request pipeline; sync failures propagate to the
//! caller, since sync hooks are typically invoked from contexts (like gate checks) that
//! must see the failure immediately.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::priority::Priority;

/// Mutable payload threaded through a chain of callbacks. Each callback receives ownership,
/// may mutate `data`/`result`, and hands it back; this mirrors the promise-chained,
/// context-mutation dispatch style the hook engine is modeled on, without fighting Rust's
/// borrow checker over a shared `&mut` across `'static` async boundaries.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub data: Value,
    pub result: Option<Value>,
    pub object_class: Option<String>,
    pub user_id: Option<String>,
}

impl HookContext {
    pub fn with_data(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }
}

/// Whether a hook dispatch runs its callbacks as async futures or as plain sync closures.
/// Sync hooks exist for call sites (gates, middleware sort) that cannot await.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Async,
    Sync,
}

type AsyncCallback = Arc<
    dyn Fn(HookContext) -> Pin<Box<dyn Future<Output = (HookContext, Result<(), RuntimeError>)> + Send>>
        + Send
        + Sync,
>;
type SyncCallback = Arc<dyn Fn(HookContext) -> (HookContext, Result<(), RuntimeError>) + Send + Sync>;

#[derive(Clone)]
enum Callback {
    Async(AsyncCallback),
    Sync(SyncCallback),
}

/// `{ id, order, callback, domain }`, immutable once registered except by unregistration.
struct HookDeclaration {
    id: Uuid,
    name: String,
    domain: String,
    order: i32,
    seq: u64,
    callback: Callback,
}

impl fmt::Debug for HookDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDeclaration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("order", &self.order)
            .field("seq", &self.seq)
            .finish()
    }
}

/// The default domain assigned to a registration that doesn't name one explicitly.
pub const DEFAULT_DOMAIN: &str = "default";

/// Priority-ordered callback bus keyed by `name`. Holds three indices over the same set
/// of declarations: the primary `id → HookDeclaration` map (doubles as the secondary
/// index the spec calls out, since removal from it alone is enough to drop a callback
/// everywhere), and `(name, domain) → set<id>` for bulk-by-domain unregistration. Every
/// id appears in both or neither.
#[derive(Default)]
pub struct HookEngine {
    entries: RwLock<HashMap<Uuid, HookDeclaration>>,
    by_domain: RwLock<HashMap<(String, String), HashSet<Uuid>>>,
    seq: AtomicU64,
}

impl HookEngine {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            by_domain: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, entry: HookDeclaration) -> Uuid {
        let id = entry.id;
        let key = (entry.name.clone(), entry.domain.clone());
        self.entries.write().insert(id, entry);
        self.by_domain.write().entry(key).or_default().insert(id);
        id
    }

    /// Registers an async callback under `name`, tagged with `domain` for later bulk
    /// removal via [`HookEngine::unregister_domain`]. Returns the callback's id, usable
    /// with [`HookEngine::unregister`].
    pub fn register<F, Fut>(&self, name: &str, domain: &str, order: impl Into<i32>, callback: F) -> Uuid
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (HookContext, Result<(), RuntimeError>)> + Send + 'static,
    {
        self.insert(HookDeclaration {
            id: Uuid::new_v4(),
            name: name.to_string(),
            domain: domain.to_string(),
            order: order.into(),
            seq: self.next_seq(),
            callback: Callback::Async(Arc::new(move |ctx| Box::pin(callback(ctx)))),
        })
    }

    /// Registers a synchronous callback, for call sites that dispatch outside an async
    /// context (e.g. the function-gateway gate check).
    pub fn register_sync<F>(&self, name: &str, domain: &str, order: impl Into<i32>, callback: F) -> Uuid
    where
        F: Fn(HookContext) -> (HookContext, Result<(), RuntimeError>) + Send + Sync + 'static,
    {
        self.insert(HookDeclaration {
            id: Uuid::new_v4(),
            name: name.to_string(),
            domain: domain.to_string(),
            order: order.into(),
            seq: self.next_seq(),
            callback: Callback::Sync(Arc::new(callback)),
        })
    }

    /// Convenience overload taking a [`Priority`] band instead of a raw order.
    pub fn register_with_priority<F, Fut>(&self, name: &str, domain: &str, priority: Priority, callback: F) -> Uuid
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (HookContext, Result<(), RuntimeError>)> + Send + 'static,
    {
        self.register(name, domain, priority.value(), callback)
    }

    /// Removes the callback registered under `id`. O(1): a single removal from the
    /// primary map plus a single removal from the `(name, domain)` set it belongs to.
    pub fn unregister(&self, id: Uuid) -> bool {
        let entry = match self.entries.write().remove(&id) {
            Some(entry) => entry,
            None => return false,
        };
        if let Some(ids) = self.by_domain.write().get_mut(&(entry.name, entry.domain)) {
            ids.remove(&id);
        }
        true
    }

    /// Removes every callback registered under `(name, domain)` in one shot via the
    /// tertiary index, ignoring any other domain registered under the same name.
    pub fn unregister_domain(&self, name: &str, domain: &str) -> usize {
        let ids = self
            .by_domain
            .write()
            .remove(&(name.to_string(), domain.to_string()))
            .unwrap_or_default();
        let mut entries = self.entries.write();
        let mut removed = 0;
        for id in ids {
            if entries.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Removes every callback registered under `name`, across all domains.
    pub fn flush(&self, name: &str) -> usize {
        let mut entries = self.entries.write();
        let removed_ids: Vec<Uuid> = entries
            .iter()
            .filter(|(_, e)| e.name == name)
            .map(|(id, _)| *id)
            .collect();
        for id in &removed_ids {
            entries.remove(id);
        }
        drop(entries);

        self.by_domain.write().retain(|(bucket_name, _), ids| {
            if bucket_name == name {
                false
            } else {
                ids.retain(|id| !removed_ids.contains(id));
                true
            }
        });
        removed_ids.len()
    }

    fn matching(&self, name: &str) -> Vec<(Uuid, i32, u64, Callback)> {
        let entries = self.entries.read();
        let mut matched: Vec<_> = entries
            .values()
            .filter(|e| e.name == name)
            .map(|e| (e.id, e.order, e.seq, e.callback.clone()))
            .collect();
        matched.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
        matched
    }

    /// Runs every async callback registered for `name`, sequentially, in priority order.
    /// Each callback's error is logged and swallowed: one bad callback never stops the
    /// rest of the chain from running.
    pub async fn run(&self, name: &str, mut ctx: HookContext) -> HookContext {
        for (id, _, _, callback) in self.matching(name) {
            let result = match callback {
                Callback::Async(f) => f(ctx).await,
                Callback::Sync(f) => f(ctx),
            };
            ctx = result.0;
            if let Err(err) = result.1 {
                tracing::warn!(hook = name, callback_id = %id, error = %err, "hook callback failed");
            }
        }
        ctx
    }

    /// Runs every sync callback registered for `name`. Stops and returns the error on
    /// the first failure, since sync dispatch is used where the caller needs to react to
    /// failure immediately (e.g. closing a gate).
    pub fn run_sync(&self, name: &str, mut ctx: HookContext) -> (HookContext, Result<(), RuntimeError>) {
        for (_, _, _, callback) in self.matching(name) {
            let (next_ctx, result) = match callback {
                Callback::Sync(f) => f(ctx),
                Callback::Async(_) => {
                    panic!("run_sync encountered an async callback for hook '{name}'; register it with register_sync");
                }
            };
            ctx = next_ctx;
            if result.is_err() {
                return (ctx, result);
            }
        }
        (ctx, Ok(()))
    }

    /// Lists `(name, domain)` pairs with at least one registered callback, for
    /// introspection endpoints and tests.
    pub fn list(&self) -> Vec<(String, String)> {
        let entries = self.entries.read();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for e in entries.values() {
            let key = (e.name.clone(), e.domain.clone());
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    }
}
