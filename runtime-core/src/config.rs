//! Environment configuration loading.
//!
//! Precedence, highest to lowest: an explicit env-file path, a named env-id file, the
//! default `env.json`, each layer then overridden by process environment variables. A
//! missing required field is the one fatal path in the whole runtime (see
//! [`crate::error::RuntimeError::EnvironmentLoad`]); everything else is logged and
//! contained.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

const ENV_FILE_VAR: &str = "RUNTIME_ENV_FILE";
const ENV_ID_VAR: &str = "RUNTIME_ENV_ID";
const SRC_DIR_VAR: &str = "RUNTIME_SRC_DIR";

/// Raw, pre-validation view of the environment file (or process overrides). Every field is
/// optional here; [`RuntimeConfig::load`] enforces which ones are required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawEnv {
    #[serde(default)]
    database_uri: Option<String>,
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    master_key: Option<String>,
    #[serde(default)]
    refresh_token_secret: Option<String>,
    #[serde(default)]
    access_token_secret: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    server_uri: Option<String>,
    #[serde(default)]
    public_server_uri: Option<String>,
    #[serde(default)]
    direct_file_access: Option<bool>,
    #[serde(default)]
    preserve_filename: Option<bool>,
    #[serde(default)]
    max_upload_size: Option<String>,
    #[serde(default)]
    live_query_server: Option<bool>,
    #[serde(default)]
    tls_cert_path: Option<String>,
    #[serde(default)]
    tls_key_path: Option<String>,
    #[serde(default)]
    log_level: Option<String>,
}

impl RawEnv {
    fn merge(mut self, other: RawEnv) -> RawEnv {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(database_uri);
        take!(app_id);
        take!(master_key);
        take!(refresh_token_secret);
        take!(access_token_secret);
        take!(port);
        take!(server_uri);
        take!(public_server_uri);
        take!(direct_file_access);
        take!(preserve_filename);
        take!(max_upload_size);
        take!(live_query_server);
        take!(tls_cert_path);
        take!(tls_key_path);
        take!(log_level);
        self
    }

    fn from_process_env() -> RawEnv {
        RawEnv {
            database_uri: std::env::var("DATABASE_URI").ok(),
            app_id: std::env::var("APP_ID").ok(),
            master_key: std::env::var("MASTER_KEY").ok(),
            refresh_token_secret: std::env::var("REFRESH_TOKEN_SECRET").ok(),
            access_token_secret: std::env::var("ACCESS_TOKEN_SECRET").ok(),
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()),
            server_uri: std::env::var("SERVER_URI").ok(),
            public_server_uri: std::env::var("PUBLIC_SERVER_URI").ok(),
            direct_file_access: std::env::var("DIRECT_FILE_ACCESS").ok().and_then(|v| v.parse().ok()),
            preserve_filename: std::env::var("PRESERVE_FILENAME").ok().and_then(|v| v.parse().ok()),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE").ok(),
            live_query_server: std::env::var("LIVE_QUERY_SERVER").ok().and_then(|v| v.parse().ok()),
            tls_cert_path: std::env::var("TLS_CERT_PATH").ok(),
            tls_key_path: std::env::var("TLS_KEY_PATH").ok(),
            log_level: std::env::var("LOG_LEVEL").ok(),
        }
    }
}

/// Fully resolved, validated runtime configuration. Derived fields (`port`, `server_uri`,
/// `public_server_uri`) are computed once at load time, not recomputed per use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// The root directory plugin/middleware/API-function discovery walks, per §6.
    /// Defaults to `.` and is overridden by `RUNTIME_SRC_DIR`.
    pub src_dir: PathBuf,

    pub database_uri: String,
    pub app_id: String,
    pub master_key: String,
    pub refresh_token_secret: String,
    pub access_token_secret: String,

    pub port: u16,
    pub server_uri: String,
    pub public_server_uri: String,

    pub direct_file_access: bool,
    pub preserve_filename: bool,
    pub max_upload_size: String,
    pub live_query_server: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub log_level: String,
}

impl RuntimeConfig {
    /// Loads and validates configuration following the precedence documented on the
    /// module: explicit env-file path, named env-id file, default `env.json`, overridden
    /// by process environment. Returns [`RuntimeError::EnvironmentLoad`] on any missing
    /// required field — the only fatal error path in the runtime.
    pub fn load() -> Result<Self, RuntimeError> {
        let src_dir = std::env::var(SRC_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let mut resolved = RawEnv::default();

        let default_path = Self::default_env_path(&src_dir);
        if let Some(raw) = Self::read_env_file(&default_path) {
            resolved = resolved.merge(raw);
        }

        if let Ok(env_id) = std::env::var(ENV_ID_VAR) {
            let path = Self::named_env_path(&src_dir, &env_id)?;
            if let Some(raw) = Self::read_env_file(&path) {
                resolved = resolved.merge(raw);
            }
        }

        if let Ok(explicit) = std::env::var(ENV_FILE_VAR) {
            let path = PathBuf::from(explicit);
            if let Some(raw) = Self::read_env_file(&path) {
                resolved = resolved.merge(raw);
            }
        }

        resolved = resolved.merge(RawEnv::from_process_env());

        Self::finalize(resolved, src_dir)
    }

    /// Builds config directly from a map, bypassing the filesystem, for tests and
    /// embedded callers that already have their settings in hand. `src_dir` defaults to
    /// `.` when not given.
    pub fn from_map(values: HashMap<String, String>) -> Result<Self, RuntimeError> {
        let src_dir = values.get("src_dir").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        let raw = RawEnv {
            database_uri: values.get("database_uri").cloned(),
            app_id: values.get("app_id").cloned(),
            master_key: values.get("master_key").cloned(),
            refresh_token_secret: values.get("refresh_token_secret").cloned(),
            access_token_secret: values.get("access_token_secret").cloned(),
            port: values.get("port").and_then(|v| v.parse().ok()),
            server_uri: values.get("server_uri").cloned(),
            public_server_uri: values.get("public_server_uri").cloned(),
            direct_file_access: values.get("direct_file_access").and_then(|v| v.parse().ok()),
            preserve_filename: values.get("preserve_filename").and_then(|v| v.parse().ok()),
            max_upload_size: values.get("max_upload_size").cloned(),
            live_query_server: values.get("live_query_server").and_then(|v| v.parse().ok()),
            tls_cert_path: values.get("tls_cert_path").cloned(),
            tls_key_path: values.get("tls_key_path").cloned(),
            log_level: values.get("log_level").cloned(),
        };
        Self::finalize(raw, src_dir)
    }

    fn default_env_path(src_dir: &Path) -> PathBuf {
        src_dir.join("env.json")
    }

    fn named_env_path(src_dir: &Path, env_id: &str) -> Result<PathBuf, RuntimeError> {
        let valid = !env_id.is_empty()
            && env_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(RuntimeError::EnvironmentLoad(format!(
                "invalid {ENV_ID_VAR} '{env_id}': must match [A-Za-z0-9_-]+"
            )));
        }
        Ok(src_dir.join(format!("env.{env_id}.json")))
    }

    fn read_env_file(path: &Path) -> Option<RawEnv> {
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse env file, skipping");
                None
            }
        }
    }

    fn finalize(raw: RawEnv, src_dir: PathBuf) -> Result<Self, RuntimeError> {
        let database_uri = require(raw.database_uri, "database_uri")?;
        let app_id = require(raw.app_id, "app_id")?;
        let master_key = require(raw.master_key, "master_key")?;
        let refresh_token_secret = require(raw.refresh_token_secret, "refresh_token_secret")?;
        let access_token_secret = require(raw.access_token_secret, "access_token_secret")?;

        let port = raw.port.unwrap_or(1337);
        let server_uri = raw
            .server_uri
            .unwrap_or_else(|| format!("http://localhost:{port}/api"));
        let public_server_uri = raw.public_server_uri.unwrap_or_else(|| server_uri.clone());

        Ok(RuntimeConfig {
            src_dir,
            database_uri,
            app_id,
            master_key,
            refresh_token_secret,
            access_token_secret,
            port,
            server_uri,
            public_server_uri,
            direct_file_access: raw.direct_file_access.unwrap_or(false),
            preserve_filename: raw.preserve_filename.unwrap_or(false),
            max_upload_size: raw.max_upload_size.unwrap_or_else(|| "20mb".to_string()),
            live_query_server: raw.live_query_server.unwrap_or(false),
            tls_cert_path: raw.tls_cert_path,
            tls_key_path: raw.tls_key_path,
            log_level: raw.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }

    /// A secrets-redacted snapshot suitable for boot-time logging.
    pub fn redacted_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "database_uri": redact(&self.database_uri),
            "app_id": self.app_id,
            "master_key": redact(&self.master_key),
            "refresh_token_secret": redact(&self.refresh_token_secret),
            "access_token_secret": redact(&self.access_token_secret),
            "port": self.port,
            "server_uri": self.server_uri,
            "public_server_uri": self.public_server_uri,
            "direct_file_access": self.direct_file_access,
            "preserve_filename": self.preserve_filename,
            "max_upload_size": self.max_upload_size,
            "live_query_server": self.live_query_server,
            "log_level": self.log_level,
        })
    }
}

fn require(value: Option<String>, field: &str) -> Result<String, RuntimeError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RuntimeError::EnvironmentLoad(format!("missing required field '{field}'"))),
    }
}

fn redact(_value: &str) -> &'static str {
    "***"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_map() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("database_uri".into(), "mongodb://localhost/app".into());
        m.insert("app_id".into(), "myAppId".into());
        m.insert("master_key".into(), "secret".into());
        m.insert("refresh_token_secret".into(), "refresh-secret".into());
        m.insert("access_token_secret".into(), "access-secret".into());
        m
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let mut m = required_map();
        m.remove("master_key");
        let result = RuntimeConfig::from_map(m);
        assert!(matches!(result, Err(RuntimeError::EnvironmentLoad(_))));
    }

    #[test]
    fn derives_server_uri_from_port() {
        let mut m = required_map();
        m.insert("port".into(), "8080".into());
        let config = RuntimeConfig::from_map(m).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.server_uri, "http://localhost:8080/api");
        assert_eq!(config.public_server_uri, config.server_uri);
    }

    #[test]
    fn redacted_snapshot_hides_secrets() {
        let config = RuntimeConfig::from_map(required_map()).unwrap();
        let snapshot = config.redacted_snapshot();
        assert_eq!(snapshot["master_key"], "***");
        assert_eq!(snapshot["app_id"], "myAppId");
    }

    #[test]
    fn rejects_invalid_env_id() {
        let err = RuntimeConfig::named_env_path(Path::new("."), "bad id!").unwrap_err();
        assert!(matches!(err, RuntimeError::EnvironmentLoad(_)));
    }
}
