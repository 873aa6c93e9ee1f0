//! Data-store trigger interception and the storage adapter proxy.
//!
//! These two extension points sit directly in front of the document database: every
//! `save`/`destroy` call is wrapped in a before/after hook chain, and every blob write
//! goes through whichever [`files::FilesAdapter`] is currently installed.

pub mod document;
pub mod files;

pub use document::{DocumentStore, InMemoryStore, StoreObject, TriggerInterceptor};
pub use files::{AdapterInstaller, DatabaseBlobAdapter, FilesAdapter, FilesAdapterProxy, DEFAULT_ADAPTER_ID};
