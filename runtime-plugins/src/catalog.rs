//! The plugin catalog: registration, version gating, database sync, lifecycle hook
//! firing, and the `isActive`/`isValid`/`gate` queries every other subsystem calls
//! through.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use runtime_core::{HookContext, HookEngine, Priority, RuntimeError};
use runtime_store::{DocumentStore, StoreObject};
use semver::Version;
use serde_json::Value;

use crate::migration::MigrationSet;
use crate::plugin::Plugin;

/// Lifecycle hook names, in the order they can first fire (§6).
pub mod hook_names {
    pub const INSTALL: &str = "install";
    pub const SCHEMA: &str = "schema";
    pub const ACTIVATE: &str = "activate";
    pub const UPDATE: &str = "update";
    pub const DEACTIVATE: &str = "deactivate";
    pub const UNINSTALL: &str = "uninstall";
    pub const PLUGIN_LOAD: &str = "plugin-load";
    pub const PLUGIN_BEFORE_SAVE: &str = "plugin-before-save";
}

/// Persisted row shape: `{id, name, description, active, order, version, meta}`. The row
/// is the source of truth for `active`; every other field may be rewritten from the
/// in-memory registration.
fn plugin_to_row(plugin: &Plugin) -> Value {
    serde_json::json!({
        "id": plugin.id,
        "name": plugin.name,
        "description": plugin.description,
        "active": plugin.active,
        "order": plugin.order,
        "version": plugin.version.plugin,
        "meta": plugin.meta,
    })
}

fn row_active(row: &Value) -> Option<bool> {
    row.get("active").and_then(|v| v.as_bool())
}

fn row_version(row: &Value) -> Option<Version> {
    row.get("version").and_then(|v| v.as_str()).and_then(|s| Version::parse(s).ok())
}

/// Owns the in-memory plugin table and mirrors it to the persistent store. Cross-plugin
/// references elsewhere in the runtime are by id only, never by pointer into this table.
pub struct Catalog {
    runtime_version: Version,
    core_root: Option<std::path::PathBuf>,
    hooks: Arc<HookEngine>,
    store: Arc<dyn DocumentStore>,
    plugins: DashMap<String, Plugin>,
    banned: parking_lot::RwLock<HashSet<String>>,
    migrations: DashMap<String, MigrationSet>,
}

impl Catalog {
    pub fn new(runtime_version: Version, hooks: Arc<HookEngine>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            runtime_version,
            core_root: None,
            hooks,
            store,
            plugins: DashMap::new(),
            banned: parking_lot::RwLock::new(HashSet::new()),
            migrations: DashMap::new(),
        }
    }

    /// Registers the `update` migration steps for `plugin_id`. A later call with the
    /// same id replaces the previous set.
    pub fn register_migrations(&self, plugin_id: impl Into<String>, migrations: MigrationSet) {
        self.migrations.insert(plugin_id.into(), migrations);
    }

    /// Declares the framework's internal plugin directory, used by built-in detection at
    /// register time.
    pub fn with_core_root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.core_root = Some(root.into());
        self
    }

    pub fn ban(&self, id: impl Into<String>) {
        self.banned.write().insert(id.into());
    }

    /// Registers a plugin discovered at `discovered_from`. Built-in status is detected by
    /// comparing that path against the configured core root, rather than by stack-trace
    /// inspection: if internal, `meta.builtIn` is forced true, `meta.group` defaults to
    /// `"core"`, and `version.runtime_compat` is overridden to accept any runtime at or
    /// above the one currently running.
    pub fn register(
        &self,
        mut plugin: Plugin,
        default_active: bool,
        discovered_from: Option<&std::path::Path>,
    ) -> Result<(), RuntimeError> {
        if plugin.id.is_empty() {
            return Err(RuntimeError::PluginRejected {
                id: plugin.id.clone(),
                reason: "plugin id is empty".to_string(),
            });
        }
        if self.banned.read().contains(&plugin.id) {
            return Err(RuntimeError::PluginRejected {
                id: plugin.id.clone(),
                reason: "plugin id is banned".to_string(),
            });
        }

        if let (Some(core_root), Some(from)) = (&self.core_root, discovered_from) {
            if from.starts_with(core_root) {
                plugin.meta.built_in = true;
                if plugin.meta.group.is_none() {
                    plugin.meta.group = Some("core".to_string());
                }
                plugin.version.runtime_compat = format!(">={}", self.runtime_version);
            }
        }

        if !plugin.version.satisfies(&self.runtime_version) {
            return Err(RuntimeError::VersionMismatch {
                id: plugin.id.clone(),
                required: plugin.version.runtime_compat.clone(),
                running: self.runtime_version.to_string(),
            });
        }

        plugin.active = default_active;
        self.plugins.insert(plugin.id.clone(), plugin);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Plugin> {
        self.plugins.get(id).map(|p| p.clone())
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.plugins.get(id).map(|p| p.active).unwrap_or(false)
    }

    /// Re-runs the semver check; with `strict`, additionally requires the plugin to be
    /// active.
    pub fn is_valid(&self, id: &str, strict: bool) -> bool {
        match self.plugins.get(id) {
            Some(p) => {
                let version_ok = p.version.satisfies(&self.runtime_version);
                version_ok && (!strict || p.active)
            }
            None => false,
        }
    }

    /// Rejects with the fixed gateway message if `id` is not active, otherwise invokes
    /// `callback`.
    pub fn gate<T>(
        &self,
        id: &str,
        name: &str,
        callback: impl FnOnce() -> T,
    ) -> Result<T, RuntimeError> {
        if !self.is_active(id) {
            return Err(RuntimeError::GateClosed {
                id: id.to_string(),
                name: name.to_string(),
            });
        }
        Ok(callback())
    }

    /// Reconciles every cached plugin against its persistent row, firing the full
    /// lifecycle hook sequence per the transition table in §4.2, then persists and fires
    /// `plugin-load`.
    pub async fn sync_with_store(&self) -> Result<(), RuntimeError> {
        let ids: Vec<String> = self.plugins.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.sync_one(&id).await?;
        }
        Ok(())
    }

    async fn sync_one(&self, id: &str) -> Result<(), RuntimeError> {
        let cached = match self.get(id) {
            Some(p) => p,
            None => return Ok(()),
        };

        let existing_row = self
            .store
            .find("Plugin", id)
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;

        let (active, old_version) = match &existing_row {
            Some(row) => (row_active(row).unwrap_or(cached.active), row_version(row)),
            None => (cached.active, None),
        };

        let mut plugin = cached.clone();
        plugin.active = active;
        let mut migrated_fields: Option<Value> = None;

        if existing_row.is_none() {
            self.fire(hook_names::PLUGIN_BEFORE_SAVE, &plugin).await;
            if plugin.active {
                self.fire(hook_names::INSTALL, &plugin).await;
                self.fire(hook_names::SCHEMA, &plugin).await;
                self.fire(hook_names::ACTIVATE, &plugin).await;
            }
        } else {
            let was_active = existing_row.as_ref().and_then(row_active).unwrap_or(false);

            if let (Some(old), Some(new)) = (&old_version, plugin.version.plugin_version()) {
                if !was_active && plugin.active {
                    self.fire(hook_names::SCHEMA, &plugin).await;
                    self.fire(hook_names::ACTIVATE, &plugin).await;
                } else if was_active && !plugin.active {
                    self.fire(hook_names::DEACTIVATE, &plugin).await;
                } else if was_active && plugin.active && new > *old {
                    if let Some(migrations) = self.migrations.get(id) {
                        let current = existing_row.clone().unwrap_or_else(|| plugin_to_row(&plugin));
                        migrated_fields = Some(migrations.run(old, &new, current).await);
                    }
                    self.fire_with_old(hook_names::UPDATE, &plugin, old).await;
                } else if was_active && plugin.active && new < *old {
                    tracing::warn!(plugin_id = %plugin.id, old = %old, new = %new, "registered plugin version is older than the stored version");
                }
            } else if !was_active && plugin.active {
                self.fire(hook_names::SCHEMA, &plugin).await;
                self.fire(hook_names::ACTIVATE, &plugin).await;
            } else if was_active && !plugin.active {
                self.fire(hook_names::DEACTIVATE, &plugin).await;
            }
        }

        let mut row = plugin_to_row(&plugin);
        if let (Some(Value::Object(migrated)), Value::Object(row_obj)) = (migrated_fields, &mut row) {
            for (key, value) in migrated {
                row_obj.entry(key).or_insert(value);
            }
        }
        self.store
            .persist(&StoreObject {
                class_name: "Plugin".to_string(),
                id: Some(id.to_string()),
                data: row,
            })
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;

        self.fire(hook_names::PLUGIN_LOAD, &plugin).await;
        self.plugins.insert(id.to_string(), plugin);
        Ok(())
    }

    /// Fires a lifecycle hook with `{plugin}` (and `old`, for `update`). Hook authors
    /// must early-return if `plugin.id` doesn't match their own id.
    async fn fire(&self, name: &str, plugin: &Plugin) {
        let ctx = HookContext::with_data(serde_json::json!({ "plugin": plugin }));
        self.hooks.run(name, ctx).await;
    }

    async fn fire_with_old(&self, name: &str, plugin: &Plugin, old: &Version) {
        let ctx = HookContext::with_data(serde_json::json!({ "plugin": plugin, "old": old.to_string() }));
        self.hooks.run(name, ctx).await;
    }

    /// Marks `id` deactivated then uninstalled, refusing if the plugin is built-in — the
    /// fixed rejection the before-delete interceptor raises in the system this is
    /// modeled on.
    pub async fn delete(&self, id: &str) -> Result<(), RuntimeError> {
        let plugin = self
            .get(id)
            .ok_or_else(|| RuntimeError::PluginRejected {
                id: id.to_string(),
                reason: "unknown plugin".to_string(),
            })?;

        if plugin.meta.built_in {
            return Err(RuntimeError::PluginRejected {
                id: id.to_string(),
                reason: "built-in plugins cannot be deleted".to_string(),
            });
        }

        self.fire(hook_names::DEACTIVATE, &plugin).await;
        self.store
            .remove(&StoreObject {
                class_name: "Plugin".to_string(),
                id: Some(id.to_string()),
                data: Value::Null,
            })
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        self.fire(hook_names::UNINSTALL, &plugin).await;
        self.plugins.remove(id);
        Ok(())
    }

    pub fn list(&self) -> Vec<Plugin> {
        self.plugins.iter().map(|e| e.value().clone()).collect()
    }

    /// The hook engine this catalog fires lifecycle events through, exposed so
    /// collaborators like [`crate::assets::add_meta_asset`] can hang their own
    /// activate/update listeners off the same bus.
    pub fn hooks(&self) -> Arc<HookEngine> {
        self.hooks.clone()
    }

    /// Writes `url` into the cached plugin's `meta.assets` at `object_path` and
    /// re-persists the row. A no-op if `id` isn't registered. Called from the asset
    /// publishing hook handler once a file upload completes.
    pub async fn apply_meta_asset(&self, id: &str, object_path: &str, url: Value) -> Result<(), RuntimeError> {
        let row = match self.plugins.get_mut(id) {
            Some(mut entry) => {
                crate::assets::set_meta_asset(&mut entry.meta, object_path, url);
                plugin_to_row(&entry)
            }
            None => return Ok(()),
        };
        self.store
            .persist(&StoreObject {
                class_name: "Plugin".to_string(),
                id: Some(id.to_string()),
                data: row,
            })
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        Ok(())
    }
}

/// Convenience constructor wiring priority-ordered hooks a lifecycle listener would
/// register against.
pub fn lifecycle_domain(plugin_id: &str) -> String {
    plugin_id.to_string()
}

pub const DEFAULT_LIFECYCLE_PRIORITY: Priority = Priority::Neutral;

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_store::InMemoryStore;
    use std::sync::Arc as StdArc;

    fn catalog() -> Catalog {
        Catalog::new(
            Version::parse("1.0.0").unwrap(),
            StdArc::new(HookEngine::new()),
            StdArc::new(InMemoryStore::default()),
        )
    }

    #[test]
    fn register_rejects_banned_ids() {
        let catalog = catalog();
        catalog.ban("blocked");
        let plugin = Plugin::new("blocked", "Blocked", "1.0.0");
        assert!(catalog.register(plugin, true, None).is_err());
    }

    #[test]
    fn register_rejects_incompatible_runtime_version() {
        let catalog = catalog();
        let plugin = Plugin::new("p", "P", "1.0.0").with_runtime_compat(">=2.0.0");
        let result = catalog.register(plugin, true, None);
        assert!(matches!(result, Err(RuntimeError::VersionMismatch { .. })));
    }

    #[test]
    fn gate_rejects_with_fixed_message_when_inactive() {
        let catalog = catalog();
        catalog.register(Plugin::new("p", "P", "1.0.0"), false, None).unwrap();
        let err = catalog.gate("p", "f", || 1).unwrap_err();
        assert_eq!(err.to_string(), "Plugin: p is not active.");
    }

    #[test]
    fn gate_invokes_callback_when_active() {
        let catalog = catalog();
        catalog.register(Plugin::new("p", "P", "1.0.0"), true, None).unwrap();
        let value = catalog.gate("p", "f", || 42).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn lifecycle_sequence_for_a_new_active_plugin() {
        let hooks = StdArc::new(HookEngine::new());
        let catalog = Catalog::new(Version::parse("1.0.0").unwrap(), hooks.clone(), StdArc::new(InMemoryStore::default()));

        let fired = StdArc::new(parking_lot::RwLock::new(Vec::<&'static str>::new()));
        for name in [
            hook_names::PLUGIN_BEFORE_SAVE,
            hook_names::INSTALL,
            hook_names::SCHEMA,
            hook_names::ACTIVATE,
            hook_names::PLUGIN_LOAD,
        ] {
            let f = fired.clone();
            let label: &'static str = name;
            hooks.register(name, "p", Priority::Neutral, move |ctx| {
                let f = f.clone();
                async move {
                    f.write().push(label);
                    (ctx, Ok(()))
                }
            });
        }

        catalog.register(Plugin::new("p", "P", "1.0.0"), true, None).unwrap();
        catalog.sync_with_store().await.unwrap();

        assert_eq!(
            fired.read().clone(),
            vec!["plugin-before-save", "install", "schema", "activate", "plugin-load"]
        );
    }

    #[tokio::test]
    async fn update_runs_registered_migrations_before_firing_the_update_hook() {
        let hooks = StdArc::new(HookEngine::new());
        let store = StdArc::new(InMemoryStore::default());
        let catalog = Catalog::new(Version::parse("1.0.0").unwrap(), hooks.clone(), store.clone());

        catalog.register(Plugin::new("p", "P", "1.0.3"), true, None).unwrap();
        catalog.sync_with_store().await.unwrap();

        let mut migrations = crate::migration::MigrationSet::new();
        migrations.register("1.0.4", |mut v| async move {
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("1.0.4"));
            v
        });
        migrations.register("1.0.5", |mut v| async move {
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("1.0.5"));
            v
        });
        migrations.register("1.0.6", |mut v| async move {
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("1.0.6"));
            v
        });
        catalog.register_migrations("p", migrations);

        let updated = Plugin::new("p", "P", "1.0.6");
        let mut row = store.find("Plugin", "p").await.unwrap().unwrap();
        row["touched"] = serde_json::json!([]);
        store
            .persist(&runtime_store::StoreObject {
                class_name: "Plugin".to_string(),
                id: Some("p".to_string()),
                data: row,
            })
            .await
            .unwrap();

        let fired = StdArc::new(parking_lot::RwLock::new(false));
        let f = fired.clone();
        hooks.register(hook_names::UPDATE, "p", Priority::Neutral, move |ctx| {
            let f = f.clone();
            async move {
                *f.write() = true;
                (ctx, Ok(()))
            }
        });

        catalog.register(updated, true, None).unwrap();
        catalog.sync_with_store().await.unwrap();

        assert!(*fired.read());
        let row = store.find("Plugin", "p").await.unwrap().unwrap();
        assert_eq!(row["touched"], serde_json::json!(["1.0.4", "1.0.5", "1.0.6"]));
    }

    #[tokio::test]
    async fn deleting_a_built_in_plugin_is_rejected_and_the_row_persists() {
        let catalog = catalog();
        let mut plugin = Plugin::new("core-p", "Core", "1.0.0");
        plugin.meta.built_in = true;
        catalog.register(plugin, true, None).unwrap();
        catalog.sync_with_store().await.unwrap();

        let result = catalog.delete("core-p").await;
        assert!(result.is_err());
        assert!(catalog.get("core-p").is_some());
    }
}
