//! Unified error type shared by every subsystem.
//!
//! Internal subsystem boundaries return `Result<_, RuntimeError>` so callers can match on
//! failure kind instead of string-matching messages. `main` and the boot sequence collapse
//! this into `anyhow::Result` at the top, since the only truly fatal path in the whole
//! runtime is environment load (see the error handling design section of the spec).

use thiserror::Error;

/// Structured detail for a failed assertion inside a hook callback, so failure-isolation
/// tests can inspect `actual`/`expected`/`operator` instead of parsing a message string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionDetails {
    pub actual: String,
    pub expected: String,
    pub operator: String,
}

impl AssertionDetails {
    pub fn new(actual: impl Into<String>, expected: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            actual: actual.into(),
            expected: expected.into(),
            operator: operator.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A plugin registration was rejected at catalog register time: missing/banned id,
    /// or an incompatible `version.runtime_compat` range.
    #[error("plugin rejected: {id}: {reason}")]
    PluginRejected { id: String, reason: String },

    /// The plugin's declared runtime-compat range does not satisfy the running version.
    #[error("plugin {id} requires runtime {required}, running {running}")]
    VersionMismatch {
        id: String,
        required: String,
        running: String,
    },

    /// Function gateway gate failure. Message text is load-bearing: callers match the
    /// fixed string `"Plugin: <id> is not active."` from the external interface contract.
    #[error("Plugin: {id} is not active.")]
    GateClosed { id: String, name: String },

    /// Capability check failure on a gated call.
    #[error("Permission denied.")]
    PermissionDenied,

    /// A hook callback returned an error. `assertion` is populated when the callback
    /// failed a structured assertion helper rather than an ordinary error.
    #[error("hook {hook} callback {callback_id} failed: {source_message}")]
    HookDispatch {
        hook: String,
        callback_id: uuid::Uuid,
        source_message: String,
        assertion: Option<AssertionDetails>,
    },

    /// A storage-adapter installer returned no adapter, or panicked/errored while swapping.
    #[error("adapter swap for plugin {id} failed: {reason}")]
    AdapterSwap { id: String, reason: String },

    /// Environment/configuration load failed. This is the one fatal path: the boot
    /// orchestrator propagates it up through `anyhow` and exits the process.
    #[error("environment load failed: {0}")]
    EnvironmentLoad(String),

    /// A syndication token failed verification (bad signature, wrong secret, expired).
    #[error("token invalid: {0}")]
    TokenInvalid(String),

    /// Wraps an error surfaced by the document-store collaborator.
    #[error("store error: {0}")]
    Store(String),
}

impl RuntimeError {
    pub fn hook_dispatch(hook: impl Into<String>, callback_id: uuid::Uuid, source: impl std::fmt::Display) -> Self {
        Self::HookDispatch {
            hook: hook.into(),
            callback_id,
            source_message: source.to_string(),
            assertion: None,
        }
    }

    pub fn hook_assertion(
        hook: impl Into<String>,
        callback_id: uuid::Uuid,
        source: impl std::fmt::Display,
        assertion: AssertionDetails,
    ) -> Self {
        Self::HookDispatch {
            hook: hook.into(),
            callback_id,
            source_message: source.to_string(),
            assertion: Some(assertion),
        }
    }
}
