//! Storage adapter proxy.
//!
//! Holds exactly one "current" file adapter and delegates every call to it. Plugins swap
//! the current adapter in on `activate` and the proxy reverts to the default the moment
//! that plugin's adapter is deactivated, per §4.3.5.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use runtime_core::RuntimeError;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A plugin's storage-adapter factory, registered via `Storage.register(plugin,
/// installer, order)`: given the plugin's `(config, env)`, returns the adapter it wants
/// installed as current, or `None` to decline.
pub type AdapterInstaller = Arc<dyn Fn(&Value, &Value) -> Option<Arc<dyn FilesAdapter>> + Send + Sync>;

/// A pluggable blob-storage backend. `create_file` returns the location the proxy should
/// hand back to callers.
#[async_trait]
pub trait FilesAdapter: Send + Sync {
    async fn create_file(&self, filename: &str, data: &[u8]) -> Result<String, RuntimeError>;
    async fn delete_file(&self, location: &str) -> Result<(), RuntimeError>;
    async fn get_file_data(&self, location: &str) -> Result<Vec<u8>, RuntimeError>;
    fn get_file_location(&self, filename: &str) -> String;
    fn validate_filename(&self, filename: &str) -> Result<(), RuntimeError>;
    /// Drains `reader` into the adapter the same way `create_file` stores an in-memory
    /// buffer. The default implementation reads the stream to completion and delegates to
    /// `create_file`; adapters backed by a true streaming sink (multipart upload, chunked
    /// object-store PUT) override it to avoid buffering the whole file.
    async fn handle_file_stream(
        &self,
        filename: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<String, RuntimeError> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|err| RuntimeError::Store(format!("failed reading file stream for '{filename}': {err}")))?;
        self.create_file(filename, &buf).await
    }
}

/// The id the default, always-available adapter is installed under. Never banned, never
/// removable: it is what the proxy falls back to when no plugin adapter is current.
pub const DEFAULT_ADAPTER_ID: &str = "database-blob";

/// Default fallback adapter that stores blobs as base64 inside the document database
/// itself — no external object store required to boot.
#[derive(Default)]
pub struct DatabaseBlobAdapter {
    blobs: RwLock<std::collections::HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FilesAdapter for DatabaseBlobAdapter {
    async fn create_file(&self, filename: &str, data: &[u8]) -> Result<String, RuntimeError> {
        let location = self.get_file_location(filename);
        self.blobs.write().insert(location.clone(), data.to_vec());
        Ok(location)
    }

    async fn delete_file(&self, location: &str) -> Result<(), RuntimeError> {
        self.blobs.write().remove(location);
        Ok(())
    }

    async fn get_file_data(&self, location: &str) -> Result<Vec<u8>, RuntimeError> {
        self.blobs
            .read()
            .get(location)
            .cloned()
            .ok_or_else(|| RuntimeError::Store(format!("no blob at '{location}'")))
    }

    fn get_file_location(&self, filename: &str) -> String {
        format!("database-blob://{filename}")
    }

    fn validate_filename(&self, filename: &str) -> Result<(), RuntimeError> {
        if filename.is_empty() || filename.contains("..") {
            return Err(RuntimeError::Store(format!("invalid filename '{filename}'")));
        }
        Ok(())
    }
}

struct Current {
    id: String,
    adapter: Arc<dyn FilesAdapter>,
}

/// Delegates file operations to whichever adapter is currently installed, falling back to
/// [`DatabaseBlobAdapter`] when no plugin adapter is active.
pub struct FilesAdapterProxy {
    default_id: String,
    default_adapter: Arc<dyn FilesAdapter>,
    current: RwLock<Current>,
}

impl FilesAdapterProxy {
    pub fn new() -> Self {
        let default_adapter: Arc<dyn FilesAdapter> = Arc::new(DatabaseBlobAdapter::default());
        Self {
            default_id: DEFAULT_ADAPTER_ID.to_string(),
            default_adapter: default_adapter.clone(),
            current: RwLock::new(Current {
                id: DEFAULT_ADAPTER_ID.to_string(),
                adapter: default_adapter,
            }),
        }
    }

    pub fn current_id(&self) -> String {
        self.current.read().id.clone()
    }

    /// Installs `adapter` as current under `id`. Called from the `files-adapter` hook
    /// handler that a plugin's activation installs.
    pub fn swap(&self, id: impl Into<String>, adapter: Arc<dyn FilesAdapter>) {
        let mut current = self.current.write();
        current.id = id.into();
        current.adapter = adapter;
    }

    /// Reverts to the default adapter if `id` is the currently installed one; a no-op for
    /// any other id (deactivating a non-current adapter does nothing, per §4.3.5).
    pub fn revert_if_current(&self, id: &str) {
        let mut current = self.current.write();
        if current.id == id {
            current.id = self.default_id.clone();
            current.adapter = self.default_adapter.clone();
        }
    }

    fn adapter(&self) -> Arc<dyn FilesAdapter> {
        self.current.read().adapter.clone()
    }

    pub async fn create_file(&self, filename: &str, data: &[u8]) -> Result<String, RuntimeError> {
        self.adapter().create_file(filename, data).await
    }

    pub async fn delete_file(&self, location: &str) -> Result<(), RuntimeError> {
        self.adapter().delete_file(location).await
    }

    pub async fn get_file_data(&self, location: &str) -> Result<Vec<u8>, RuntimeError> {
        self.adapter().get_file_data(location).await
    }

    pub fn get_file_location(&self, filename: &str) -> String {
        self.adapter().get_file_location(filename)
    }

    pub fn validate_filename(&self, filename: &str) -> Result<(), RuntimeError> {
        self.adapter().validate_filename(filename)
    }

    pub async fn handle_file_stream(
        &self,
        filename: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<String, RuntimeError> {
        self.adapter().handle_file_stream(filename, reader).await
    }
}

impl Default for FilesAdapterProxy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedAdapter(&'static str);

    #[async_trait]
    impl FilesAdapter for NamedAdapter {
        async fn create_file(&self, filename: &str, _data: &[u8]) -> Result<String, RuntimeError> {
            Ok(format!("{}/{filename}", self.0))
        }
        async fn delete_file(&self, _location: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn get_file_data(&self, _location: &str) -> Result<Vec<u8>, RuntimeError> {
            Ok(vec![])
        }
        fn get_file_location(&self, filename: &str) -> String {
            format!("{}/{filename}", self.0)
        }
        fn validate_filename(&self, _filename: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    #[test]
    fn swap_sequence_follows_the_adapter_scenario() {
        let proxy = FilesAdapterProxy::new();
        assert_eq!(proxy.current_id(), DEFAULT_ADAPTER_ID);

        proxy.swap("A", Arc::new(NamedAdapter("a")));
        assert_eq!(proxy.current_id(), "A");

        proxy.swap("B", Arc::new(NamedAdapter("b")));
        assert_eq!(proxy.current_id(), "B");

        proxy.revert_if_current("B");
        assert_eq!(proxy.current_id(), "A");

        proxy.revert_if_current("A");
        assert_eq!(proxy.current_id(), DEFAULT_ADAPTER_ID);
    }

    #[test]
    fn deactivating_a_non_current_adapter_is_a_no_op() {
        let proxy = FilesAdapterProxy::new();
        proxy.swap("A", Arc::new(NamedAdapter("a")));
        proxy.revert_if_current("someone-else");
        assert_eq!(proxy.current_id(), "A");
    }

    #[tokio::test]
    async fn handle_file_stream_drains_the_reader_into_create_file() {
        let adapter = DatabaseBlobAdapter::default();
        let mut reader: &[u8] = b"hello stream";
        let location = adapter.handle_file_stream("note.txt", &mut reader).await.unwrap();
        assert_eq!(adapter.get_file_data(&location).await.unwrap(), b"hello stream");
    }

    #[tokio::test]
    async fn proxy_delegates_handle_file_stream_to_the_current_adapter() {
        let proxy = FilesAdapterProxy::new();
        proxy.swap("A", Arc::new(NamedAdapter("a")));
        let mut reader: &[u8] = b"payload";
        let location = proxy.handle_file_stream("f.bin", &mut reader).await.unwrap();
        assert_eq!(location, "a/f.bin");
    }
}
