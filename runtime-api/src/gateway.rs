//! The function gateway: plugin-owned callables registered under `(plugin_id, name)`,
//! gated on the owning plugin being active, plus a global introspection list.
//!
//! Framework-internal endpoints call [`FunctionGateway::define_unwrapped`] instead,
//! since they must stay callable regardless of any plugin's lifecycle state.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use runtime_core::RuntimeError;
use runtime_plugins::catalog::Catalog;
use serde_json::Value;

pub type GatewayCallback =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, RuntimeError>> + Send>> + Send + Sync>;

struct FunctionEntry {
    plugin_id: Option<String>,
    callback: GatewayCallback,
}

/// Dispatches named functions to their owning plugin's callback, rejecting calls whose
/// plugin has gone inactive since registration.
pub struct FunctionGateway {
    catalog: Arc<Catalog>,
    functions: RwLock<HashMap<String, FunctionEntry>>,
}

impl FunctionGateway {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `name` as owned by `plugin_id`; every call is gated on that plugin
    /// being active at call time.
    pub fn define(&self, plugin_id: impl Into<String>, name: impl Into<String>, callback: GatewayCallback) {
        let plugin_id = plugin_id.into();
        let name = name.into();
        self.functions.write().insert(
            name,
            FunctionEntry {
                plugin_id: Some(plugin_id),
                callback,
            },
        );
    }

    /// Registers a framework-internal function with no owning plugin — never gated.
    pub fn define_unwrapped(&self, name: impl Into<String>, callback: GatewayCallback) {
        self.functions.write().insert(
            name.into(),
            FunctionEntry {
                plugin_id: None,
                callback,
            },
        );
    }

    /// Looks up `name` and invokes it, failing with [`RuntimeError::GateClosed`] if its
    /// owning plugin is not active, or a not-found rejection if `name` is unregistered.
    pub async fn call(&self, name: &str, payload: Value) -> Result<Value, RuntimeError> {
        let (plugin_id, callback) = {
            let functions = self.functions.read();
            let entry = functions.get(name).ok_or_else(|| RuntimeError::PluginRejected {
                id: name.to_string(),
                reason: "no function registered under this name".to_string(),
            })?;
            (entry.plugin_id.clone(), entry.callback.clone())
        };

        if let Some(id) = plugin_id {
            if !self.catalog.is_active(&id) {
                return Err(RuntimeError::GateClosed {
                    id,
                    name: name.to_string(),
                });
            }
        }

        callback(payload).await
    }

    /// The full set of registered function names, for introspection endpoints.
    pub fn functions_list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_plugins::plugin::Plugin;
    use runtime_store::document::InMemoryStore;
    use semver::Version;
    use serde_json::json;

    fn gateway() -> (Arc<Catalog>, FunctionGateway) {
        let hooks = Arc::new(runtime_core::HookEngine::new());
        let catalog = Arc::new(Catalog::new(
            Version::parse("1.0.0").unwrap(),
            hooks,
            Arc::new(InMemoryStore::default()),
        ));
        let gateway = FunctionGateway::new(catalog.clone());
        (catalog, gateway)
    }

    #[tokio::test]
    async fn call_rejects_when_owning_plugin_is_inactive() {
        let (catalog, gateway) = gateway();
        catalog.register(Plugin::new("p1", "P1", "1.0.0"), false, None).unwrap();
        gateway.define("p1", "doThing", Arc::new(|payload| Box::pin(async move { Ok(payload) })));

        let err = gateway.call("doThing", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Plugin: p1 is not active.");
    }

    #[tokio::test]
    async fn call_succeeds_when_owning_plugin_is_active() {
        let (catalog, gateway) = gateway();
        catalog.register(Plugin::new("p1", "P1", "1.0.0"), true, None).unwrap();
        gateway.define("p1", "doThing", Arc::new(|payload| Box::pin(async move { Ok(payload) })));

        let result = gateway.call("doThing", json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn unwrapped_functions_stay_callable_with_no_plugin_registered() {
        let (_catalog, gateway) = gateway();
        gateway.define_unwrapped("health", Arc::new(|_| Box::pin(async { Ok(json!("ok")) })));
        assert_eq!(gateway.call("health", Value::Null).await.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn functions_list_returns_every_registered_name_sorted() {
        let (_catalog, gateway) = gateway();
        gateway.define_unwrapped("zeta", Arc::new(|_| Box::pin(async { Ok(Value::Null) })));
        gateway.define_unwrapped("alpha", Arc::new(|_| Box::pin(async { Ok(Value::Null) })));
        assert_eq!(gateway.functions_list(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
