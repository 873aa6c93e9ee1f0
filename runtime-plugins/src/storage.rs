//! Storage adapter registration (§4.3.5). `Storage::register` lets a plugin's installer
//! swap the active [`FilesAdapterProxy`] backend in on that plugin's `activate` and
//! revert it on `deactivate`. The spec describes this as a dedicated `files-adapter`
//! hook firing `(config, env, id, active, context)` with the adapter-providing handler
//! mutating `context.adapter`/`context.id`; here the swap is wired directly off the
//! catalog's own `activate`/`deactivate` firings instead, since [`runtime_core::HookContext`]
//! carries `serde_json::Value` data rather than trait objects and the swap needs to hand
//! over a live `Arc<dyn FilesAdapter>`. Each handler still early-returns unless the firing
//! plugin's id matches its own, exactly like every other lifecycle listener.

use std::sync::Arc;

use runtime_core::HookEngine;
use runtime_store::{AdapterInstaller, FilesAdapterProxy};
use serde_json::Value;

use crate::catalog::hook_names;

/// Registers `installer` against `plugin_id`'s activate/deactivate lifecycle. `order`
/// controls where this listener sits relative to other activate/deactivate handlers for
/// the same plugin (lower runs earlier).
pub fn register(hooks: &HookEngine, proxy: Arc<FilesAdapterProxy>, plugin_id: impl Into<String>, installer: AdapterInstaller, order: i32) {
    let plugin_id = plugin_id.into();

    let activate_proxy = proxy.clone();
    let activate_id = plugin_id.clone();
    let activate_installer = installer.clone();
    hooks.register(hook_names::ACTIVATE, &plugin_id, order, move |ctx| {
        let proxy = activate_proxy.clone();
        let target_id = activate_id.clone();
        let installer = activate_installer.clone();
        async move {
            let plugin = ctx.data.get("plugin").cloned().unwrap_or(Value::Null);
            if plugin.get("id").and_then(Value::as_str) != Some(target_id.as_str()) {
                return (ctx, Ok(()));
            }
            let config = plugin.get("meta").cloned().unwrap_or(Value::Null);
            let env = Value::Null;
            match installer(&config, &env) {
                Some(adapter) => proxy.swap(target_id.clone(), adapter),
                None => tracing::warn!(plugin_id = %target_id, "storage adapter installer declined; proxy unchanged"),
            }
            (ctx, Ok(()))
        }
    });

    let deactivate_proxy = proxy;
    let deactivate_id = plugin_id.clone();
    hooks.register(hook_names::DEACTIVATE, &plugin_id, order, move |ctx| {
        let proxy = deactivate_proxy.clone();
        let target_id = deactivate_id.clone();
        async move {
            let plugin = ctx.data.get("plugin").cloned().unwrap_or(Value::Null);
            if plugin.get("id").and_then(Value::as_str) != Some(target_id.as_str()) {
                return (ctx, Ok(()));
            }
            proxy.revert_if_current(&target_id);
            (ctx, Ok(()))
        }
    });
}
