//! The `Plugin` record and its version metadata.

use std::collections::HashMap;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ runtime-compat: semver-range, plugin: semver }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginVersion {
    pub runtime_compat: String,
    pub plugin: String,
}

impl PluginVersion {
    pub fn new(plugin: impl Into<String>, runtime_compat: impl Into<String>) -> Self {
        Self {
            runtime_compat: runtime_compat.into(),
            plugin: plugin.into(),
        }
    }

    pub fn satisfies(&self, running_runtime_version: &Version) -> bool {
        match VersionReq::parse(&self.runtime_compat) {
            Ok(req) => req.matches(running_runtime_version),
            Err(_) => false,
        }
    }

    pub fn plugin_version(&self) -> Option<Version> {
        Version::parse(&self.plugin).ok()
    }
}

/// `{ group?, builtIn, assets? }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginMeta {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub built_in: bool,
    /// Nested map of storage URLs published by [`crate::assets`].
    #[serde(default)]
    pub assets: HashMap<String, Value>,
}

/// A declared bundle of registrations: functions, middleware, hooks, assets, identified by
/// a unique, non-blacklisted id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plugin {
    pub id: String,
    pub name: String,
    pub description: String,
    pub order: i32,
    pub version: PluginVersion,
    pub meta: PluginMeta,
    pub active: bool,
}

impl Plugin {
    pub fn new(id: impl Into<String>, name: impl Into<String>, plugin_version: impl Into<String>) -> Self {
        let plugin_version = plugin_version.into();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            order: 0,
            version: PluginVersion::new(plugin_version, "*"),
            meta: PluginMeta::default(),
            active: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_runtime_compat(mut self, runtime_compat: impl Into<String>) -> Self {
        self.version.runtime_compat = runtime_compat.into();
        self
    }
}

impl runtime_core::Identifiable for Plugin {
    fn id(&self) -> String {
        self.id.clone()
    }
}
