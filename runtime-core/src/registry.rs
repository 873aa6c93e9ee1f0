//! Generic ordered/keyed collection shared by every subsystem that needs a "list of
//! extension entries": the middleware sort list, the function-gateway's introspection
//! list, the storage-adapter installer list, and the plugin catalog itself all build on
//! this one abstraction rather than hand-rolling their own `Vec`/`HashMap` bookkeeping.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RuntimeError;

/// Implemented by anything that can live in a [`Registry`]; `id()` supplies the key the
/// registry dedupes and protects by (the registry's `idField`, in the spec's vocabulary).
pub trait Identifiable {
    fn id(&self) -> String;
}

/// `Clean` mode replaces an existing entry on re-register; `History` mode keeps every
/// registration and lets `list` return all of them in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    Clean,
    History,
}

struct Inner<T> {
    items: Vec<T>,
    protected: HashSet<String>,
    banned: HashSet<String>,
}

/// Ordered, keyed collection with protection and ban lists.
///
/// The backing store is an append-only `Vec`; in `Clean` mode, `list()` walks it and keeps
/// only the last entry per id (so replacing an entry is "register again", not an in-place
/// mutation) while `History` mode returns everything that was ever registered.
pub struct Registry<T> {
    name: String,
    mode: RegistryMode,
    inner: Arc<RwLock<Inner<T>>>,
}

impl<T: Identifiable + Clone> Registry<T> {
    pub fn new(name: impl Into<String>, mode: RegistryMode) -> Self {
        Self {
            name: name.into(),
            mode,
            inner: Arc::new(RwLock::new(Inner {
                items: Vec::new(),
                protected: HashSet::new(),
                banned: HashSet::new(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&self, entry: T) -> Result<(), RuntimeError> {
        let id = entry.id();
        let mut inner = self.inner.write();
        if inner.banned.contains(&id) {
            return Err(RuntimeError::PluginRejected {
                id,
                reason: format!("id is banned from registry '{}'", self.name),
            });
        }
        inner.items.push(entry);
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Result<(), RuntimeError> {
        let mut inner = self.inner.write();
        if inner.protected.contains(id) {
            return Err(RuntimeError::PluginRejected {
                id: id.to_string(),
                reason: format!("id is protected in registry '{}'", self.name),
            });
        }
        inner.items.retain(|e| e.id() != id);
        Ok(())
    }

    pub fn protect(&self, id: impl Into<String>) {
        self.inner.write().protected.insert(id.into());
    }

    pub fn unprotect(&self, id: &str) {
        self.inner.write().protected.remove(id);
    }

    pub fn ban(&self, id: impl Into<String>) {
        let id = id.into();
        let mut inner = self.inner.write();
        inner.items.retain(|e| e.id() != id);
        inner.banned.insert(id);
    }

    pub fn unban(&self, id: &str) {
        self.inner.write().banned.remove(id);
    }

    pub fn is_banned(&self, id: &str) -> bool {
        self.inner.read().banned.contains(id)
    }

    pub fn is_protected(&self, id: &str) -> bool {
        self.inner.read().protected.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.list().into_iter().find(|e| e.id() == id)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Ordered view honoring the registry's mode: `Clean` dedupes by id keeping the last
    /// registration; `History` returns every registration ever made, in insertion order.
    pub fn list(&self) -> Vec<T> {
        let inner = self.inner.read();
        match self.mode {
            RegistryMode::History => inner.items.clone(),
            RegistryMode::Clean => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for entry in inner.items.iter().rev() {
                    if seen.insert(entry.id()) {
                        out.push(entry.clone());
                    }
                }
                out.reverse();
                out
            }
        }
    }

    /// Truncates the backing store down to the `Clean`-mode view, discarding superseded
    /// history entries. A no-op in `Clean` mode, where the backing store never grows stale.
    pub fn cleanup(&self) {
        if self.mode == RegistryMode::Clean {
            return;
        }
        let cleaned = self.list();
        let mut inner = self.inner.write();
        inner.items = cleaned;
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Entry {
        id: String,
        value: u32,
    }

    impl Identifiable for Entry {
        fn id(&self) -> String {
            self.id.clone()
        }
    }

    #[test]
    fn clean_mode_replaces_on_reregister() {
        let reg = Registry::new("test", RegistryMode::Clean);
        reg.register(Entry { id: "a".into(), value: 1 }).unwrap();
        reg.register(Entry { id: "a".into(), value: 2 }).unwrap();
        let list = reg.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].value, 2);
    }

    #[test]
    fn history_mode_keeps_all() {
        let reg = Registry::new("test", RegistryMode::History);
        reg.register(Entry { id: "a".into(), value: 1 }).unwrap();
        reg.register(Entry { id: "a".into(), value: 2 }).unwrap();
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn protected_entries_cannot_be_unregistered() {
        let reg = Registry::new("test", RegistryMode::Clean);
        reg.register(Entry { id: "a".into(), value: 1 }).unwrap();
        reg.protect("a");
        assert!(reg.unregister("a").is_err());
        assert!(reg.is_registered("a"));
        reg.unprotect("a");
        assert!(reg.unregister("a").is_ok());
        assert!(!reg.is_registered("a"));
    }

    #[test]
    fn banned_ids_are_rejected_at_register() {
        let reg = Registry::new("test", RegistryMode::Clean);
        reg.ban("a");
        assert!(reg.register(Entry { id: "a".into(), value: 1 }).is_err());
        assert!(!reg.is_registered("a"));
    }

    #[test]
    fn unregister_is_idempotent() {
        let reg = Registry::new("test", RegistryMode::Clean);
        reg.register(Entry { id: "a".into(), value: 1 }).unwrap();
        reg.unregister("a").unwrap();
        reg.unregister("a").unwrap();
        assert!(!reg.is_registered("a"));
    }
}
