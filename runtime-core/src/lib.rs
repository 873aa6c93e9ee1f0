//! Foundational types shared by every subsystem crate in the runtime: the unified error
//! type, the hook dispatch engine, the generic extension registry, priority bands,
//! environment configuration, and the boot-time logging setup.
//!
//! Nothing in this crate depends on the document database, the plugin catalog, or any
//! other subsystem — it is the base every other `runtime-*` crate builds on.

pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod priority;
pub mod registry;

pub use config::RuntimeConfig;
pub use error::{AssertionDetails, RuntimeError};
pub use hooks::{HookContext, HookEngine, HookKind, DEFAULT_DOMAIN};
pub use priority::Priority;
pub use registry::{Identifiable, Registry, RegistryMode};
