//! Asset publishing: `addMetaAsset` registers a hook so that on `activate`/`update` a
//! local file is uploaded through the storage adapter proxy and its resulting URL is
//! written back into the plugin's `meta`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use runtime_core::{HookContext, Priority, RuntimeError};
use runtime_store::FilesAdapterProxy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{hook_names, Catalog};
use crate::plugin::PluginMeta;

/// A declared asset: where the file lives on disk, and the dotted path inside
/// `meta.assets` its published URL should be written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaAsset {
    pub local_path: PathBuf,
    pub object_path: String,
    /// The basename after the default `-<version>` cache-busting transform has run.
    pub target_file_name: Option<String>,
}

impl MetaAsset {
    pub fn new(local_path: impl Into<PathBuf>, object_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            object_path: object_path.into(),
            target_file_name: None,
        }
    }
}

/// Appends `-<version>` to the asset's basename, unless it already carries that exact
/// suffix — the idempotence the open question in the design notes calls for, so repeated
/// activations never stack suffixes.
pub fn default_filename_transform(asset: &mut MetaAsset, plugin_id: &str, version: &str) {
    let stem = asset
        .local_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| plugin_id.to_string());
    let ext = asset
        .local_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let suffix = format!("-{version}");
    let base = stem.strip_suffix(&suffix).unwrap_or(&stem);
    asset.target_file_name = Some(format!("{base}{suffix}{ext}"));
}

/// Uploads `asset.local_path` through `proxy` under `plugins/<plugin_id>/<basename>` and
/// returns the published location to be written into the plugin's `meta.assets` at
/// `asset.object_path`.
pub async fn publish(
    proxy: &FilesAdapterProxy,
    plugin_id: &str,
    asset: &MetaAsset,
) -> Result<String, RuntimeError> {
    let filename = asset
        .target_file_name
        .clone()
        .or_else(|| asset.local_path.file_name().map(|f| f.to_string_lossy().to_string()))
        .ok_or_else(|| RuntimeError::Store(format!("asset for plugin {plugin_id} has no filename")))?;

    let remote_name = format!("plugins/{plugin_id}/{filename}");
    proxy.validate_filename(&remote_name)?;

    let data = std::fs::read(&asset.local_path)
        .map_err(|e| RuntimeError::Store(format!("failed to read asset {}: {e}", asset.local_path.display())))?;

    proxy.create_file(&remote_name, &data).await
}

/// Splits a dotted path like `"icon.url"` into its segments, for writing the published
/// URL into a plugin's nested `meta.assets` map.
pub fn object_path_segments(object_path: &str) -> Vec<&str> {
    object_path.split('.').collect()
}

pub fn asset_path(local_path: impl AsRef<Path>) -> PathBuf {
    local_path.as_ref().to_path_buf()
}

/// Writes `value` into `meta.assets` at the dotted path named by `object_path`,
/// creating intermediate objects as needed.
pub fn set_meta_asset(meta: &mut PluginMeta, object_path: &str, value: Value) {
    let segments = object_path_segments(object_path);
    let (head, rest) = match segments.split_first() {
        Some(parts) => parts,
        None => return,
    };
    if rest.is_empty() {
        meta.assets.insert((*head).to_string(), value);
        return;
    }
    let entry = meta
        .assets
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Default::default()));
    set_nested(entry, rest, value);
}

fn set_nested(target: &mut Value, segments: &[&str], value: Value) {
    let (head, rest) = match segments.split_first() {
        Some(parts) => parts,
        None => {
            *target = value;
            return;
        }
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    let obj = target.as_object_mut().expect("just normalized to an object");
    if rest.is_empty() {
        obj.insert((*head).to_string(), value);
    } else {
        let entry = obj.entry((*head).to_string()).or_insert_with(|| Value::Object(Default::default()));
        set_nested(entry, rest, value);
    }
}

/// Registers `asset` against `plugin_id` so that it is published automatically on
/// `activate`/`update`: each handler early-returns unless the firing plugin's id matches
/// `plugin_id` (per §4.2's "plugins must early-return if `plugin.id !== their-id`"
/// convention), then runs the overridable `add-meta-asset` filename transform, uploads
/// the file through `proxy`, and writes the resulting URL into the plugin's
/// `meta.assets` at `asset.object_path` via [`Catalog::apply_meta_asset`].
pub fn add_meta_asset(catalog: Arc<Catalog>, proxy: Arc<FilesAdapterProxy>, plugin_id: impl Into<String>, asset: MetaAsset) {
    let plugin_id = plugin_id.into();
    let discriminator = format!("{plugin_id}:{}", asset.object_path);
    let hooks = catalog.hooks();

    {
        let discriminator = discriminator.clone();
        hooks.register_sync("add-meta-asset", &plugin_id, Priority::Neutral, move |ctx| {
            if ctx.data.get("discriminator").and_then(Value::as_str) != Some(discriminator.as_str()) {
                return (ctx, Ok(()));
            }
            let mut asset: MetaAsset = match serde_json::from_value(ctx.data["asset"].clone()) {
                Ok(asset) => asset,
                Err(_) => return (ctx, Ok(())),
            };
            let plugin_id = ctx.data["plugin_id"].as_str().unwrap_or_default().to_string();
            let version = ctx.data["version"].as_str().unwrap_or_default().to_string();
            default_filename_transform(&mut asset, &plugin_id, &version);

            let mut ctx = ctx;
            ctx.data["asset"] = serde_json::to_value(&asset).unwrap_or(Value::Null);
            (ctx, Ok(()))
        });
    }

    for lifecycle_name in [hook_names::ACTIVATE, hook_names::UPDATE] {
        let target_id = plugin_id.clone();
        let asset = asset.clone();
        let discriminator = discriminator.clone();
        let proxy = proxy.clone();
        let catalog = catalog.clone();
        let hooks_for_closure = hooks.clone();

        hooks.register(lifecycle_name, &plugin_id, Priority::Low, move |ctx| {
            let target_id = target_id.clone();
            let asset = asset.clone();
            let discriminator = discriminator.clone();
            let proxy = proxy.clone();
            let catalog = catalog.clone();
            let hooks = hooks_for_closure.clone();
            async move {
                let plugin_in_ctx = ctx.data.get("plugin").cloned().unwrap_or(Value::Null);
                let id_matches = plugin_in_ctx.get("id").and_then(Value::as_str) == Some(target_id.as_str());
                if !id_matches {
                    return (ctx, Ok(()));
                }

                let version = plugin_in_ctx
                    .get("version")
                    .and_then(|v| v.get("plugin"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                let transform_ctx = HookContext::with_data(serde_json::json!({
                    "asset": asset,
                    "plugin_id": target_id,
                    "version": version,
                    "discriminator": discriminator,
                }));
                let (transform_ctx, _) = hooks.run_sync("add-meta-asset", transform_ctx);
                let transformed: MetaAsset =
                    serde_json::from_value(transform_ctx.data["asset"].clone()).unwrap_or_else(|_| asset.clone());

                match publish(&proxy, &target_id, &transformed).await {
                    Ok(url) => {
                        if let Err(err) = catalog
                            .apply_meta_asset(&target_id, &transformed.object_path, Value::String(url))
                            .await
                        {
                            tracing::warn!(plugin_id = %target_id, error = %err, "failed to persist published asset url");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(plugin_id = %target_id, error = %err, "failed to publish plugin meta asset");
                    }
                }

                (ctx, Ok(()))
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transform_appends_version_suffix() {
        let mut asset = MetaAsset::new("icon.png", "icon.url");
        default_filename_transform(&mut asset, "my-plugin", "1.2.0");
        assert_eq!(asset.target_file_name.as_deref(), Some("icon-1.2.0.png"));
    }

    #[test]
    fn default_transform_is_idempotent_across_repeated_activations() {
        let mut asset = MetaAsset::new("icon-1.2.0.png", "icon.url");
        default_filename_transform(&mut asset, "my-plugin", "1.2.0");
        assert_eq!(asset.target_file_name.as_deref(), Some("icon-1.2.0.png"));
    }

    #[tokio::test]
    async fn add_meta_asset_publishes_on_activate_and_writes_the_url_into_meta() {
        use crate::Plugin;
        use runtime_core::HookEngine;
        use runtime_store::InMemoryStore;
        use std::sync::Arc as StdArc;

        let dir = std::env::temp_dir().join(format!("runtime-plugins-add-meta-asset-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("icon.png");
        std::fs::write(&file, b"fake-png-bytes").unwrap();

        let hooks = StdArc::new(HookEngine::new());
        let store = StdArc::new(InMemoryStore::default());
        let catalog = StdArc::new(Catalog::new(semver::Version::parse("1.0.0").unwrap(), hooks, store));
        let proxy = StdArc::new(FilesAdapterProxy::new());

        let asset = MetaAsset::new(file.clone(), "icon.url");
        add_meta_asset(catalog.clone(), proxy.clone(), "my-plugin", asset);

        catalog.register(Plugin::new("my-plugin", "My Plugin", "1.2.0"), true, None).unwrap();
        catalog.sync_with_store().await.unwrap();

        let plugin = catalog.get("my-plugin").unwrap();
        let url = plugin.meta.assets.get("icon").and_then(|v| v.get("url")).and_then(Value::as_str).unwrap();
        assert!(url.contains("plugins/my-plugin/icon-1.2.0.png"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn publish_uploads_under_plugins_prefix() {
        let dir = std::env::temp_dir().join(format!("runtime-plugins-asset-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("icon.png");
        std::fs::write(&file, b"fake-png-bytes").unwrap();

        let proxy = FilesAdapterProxy::new();
        let asset = MetaAsset::new(file.clone(), "icon.url");
        let location = publish(&proxy, "my-plugin", &asset).await.unwrap();
        assert!(location.contains("plugins/my-plugin/icon.png"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
