//! The middleware chain: discovers middleware entries by filesystem pattern, sorts them
//! by `order`, applies id-keyed replacements, drops unregistered ids, and installs the
//! survivors into the axum app in that order.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use runtime_core::HookEngine;
use runtime_plugins::discovery::{discover, DiscoveryPattern};
use tracing::warn;

/// A middleware registrant. `install` mounts it onto the app; `order` controls where in
/// the chain it lands, ascending, ties by registration order.
pub struct MiddlewareEntry {
    pub id: String,
    pub order: i64,
    install: Box<dyn Fn(Router) -> Router + Send + Sync>,
}

impl MiddlewareEntry {
    pub fn new(id: impl Into<String>, order: i64, install: impl Fn(Router) -> Router + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            order,
            install: Box::new(install),
        }
    }
}

/// Holds the `sort`/`replacements`/`unregistered` registries described by the chain, and
/// assembles them into a single axum [`Router`] at boot.
pub struct MiddlewareChain {
    entries: Vec<MiddlewareEntry>,
    replacements: Vec<(String, Box<dyn Fn(Router) -> Router + Send + Sync>)>,
    unregistered: Vec<String>,
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            replacements: Vec::new(),
            unregistered: Vec::new(),
        }
    }
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: MiddlewareEntry) {
        self.entries.push(entry);
    }

    /// Swaps the install callback for an already-registered id.
    pub fn replace(&mut self, id: impl Into<String>, install: impl Fn(Router) -> Router + Send + Sync + 'static) {
        self.replacements.push((id.into(), Box::new(install)));
    }

    pub fn unregister(&mut self, id: impl Into<String>) {
        self.unregistered.push(id.into());
    }

    /// Discovers middleware files under `root` matching the configured patterns. Files
    /// this walk can't read or that fail to self-describe are logged at `warn` and
    /// skipped; discovery continues over the rest.
    pub fn discover_entries(&self, root: &Path) -> Vec<String> {
        let patterns = [
            DiscoveryPattern::new("core/middleware/**/*.rs"),
            DiscoveryPattern::new("**/*middleware.rs"),
        ];
        let mut found = Vec::new();
        for pattern in &patterns {
            let files = discover(root, pattern, "register_middleware");
            if files.is_empty() {
                warn!(pattern = %pattern.glob, "no middleware files matched this pattern");
            }
            found.extend(files.into_iter().map(|f| f.path.to_string_lossy().into_owned()));
        }
        found
    }

    /// Sorts by `order` (stable, so ties keep registration order), applies replacements,
    /// drops unregistered ids, then installs each survivor onto `router` in order.
    pub fn assemble(self, mut router: Router) -> Router {
        let mut entries = self.entries;
        entries.sort_by_key(|e| e.order);

        let unregistered = self.unregistered;
        let mut replacements = self.replacements;

        for entry in entries {
            if unregistered.contains(&entry.id) {
                continue;
            }
            if let Some(pos) = replacements.iter().position(|(id, _)| id == &entry.id) {
                let (_, replacement) = replacements.remove(pos);
                router = replacement(router);
            } else {
                router = (entry.install)(router);
            }
        }
        router
    }
}

/// Installs a middleware entry that itself dispatches the `<id>-middleware` hook,
/// letting plugins inject handlers into the chain without competing for a top-level
/// registration slot. `path`, when given, is carried into the hook's context so
/// listeners can tell which mount point fired; dispatch itself is always by the single
/// `<id>-middleware` hook name.
pub fn register_hook_middleware(chain: &mut MiddlewareChain, hooks: Arc<HookEngine>, id: &str, path: Option<&str>, order: i64) {
    let hook_name = format!("{id}-middleware");
    let mount_path = path.map(|p| p.to_string());
    chain.register(MiddlewareEntry::new(id, order, move |router| {
        let hooks = hooks.clone();
        let hook_name = hook_name.clone();
        let mount_path = mount_path.clone();
        router.layer(axum::middleware::from_fn(move |req: axum::extract::Request, next: axum::middleware::Next| {
            let hooks = hooks.clone();
            let hook_name = hook_name.clone();
            let mount_path = mount_path.clone();
            async move {
                let ctx = runtime_core::HookContext::with_data(serde_json::json!({
                    "path": req.uri().path(),
                    "mount": mount_path,
                }));
                hooks.run(&hook_name, ctx).await;
                next.run(req).await
            }
        }))
    }));
}
