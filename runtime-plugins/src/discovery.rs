//! Filesystem discovery.
//!
//! Walks a set of configured roots and matches candidate files against a small
//! glob-like pattern set — one pattern per artifact kind (plugin manifest, API
//! function, middleware). The catalog and the middleware chain in `runtime-api` share
//! this helper so the two discovery mechanisms behave identically by construction.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// One discovery pattern: a root-relative glob (`**` matches any depth, `*` matches a
/// single path segment) plus an optional exclusion glob (`**/assets/**`, for example).
#[derive(Debug, Clone)]
pub struct DiscoveryPattern {
    pub glob: String,
    pub exclude: Option<String>,
}

impl DiscoveryPattern {
    pub fn new(glob: impl Into<String>) -> Self {
        Self {
            glob: glob.into(),
            exclude: None,
        }
    }

    pub fn excluding(mut self, exclude: impl Into<String>) -> Self {
        self.exclude = Some(exclude.into());
        self
    }

    fn matches(&self, relative: &Path) -> bool {
        let path_str = relative.to_string_lossy().replace('\\', "/");
        if let Some(exclude) = &self.exclude {
            if glob_match(exclude, &path_str) {
                return false;
            }
        }
        glob_match(&self.glob, &path_str)
    }
}

/// Minimal glob matcher supporting `**` (any number of segments) and `*` (one segment,
/// no `/`). Enough to express the patterns in the external-interfaces surface without
/// pulling in a dedicated glob crate.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let candidate_parts: Vec<&str> = candidate.split('/').collect();
    glob_match_parts(&pattern_parts, &candidate_parts)
}

fn glob_match_parts(pattern: &[&str], candidate: &[&str]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=candidate.len()).any(|i| glob_match_parts(&pattern[1..], &candidate[i..]))
        }
        Some(segment) => {
            if candidate.is_empty() {
                return false;
            }
            segment_match(segment, candidate[0]) && glob_match_parts(&pattern[1..], &candidate[1..])
        }
    }
}

fn segment_match(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return candidate.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return candidate.starts_with(prefix);
    }
    pattern == candidate
}

/// A file that matched a discovery pattern and whose contents contain a self-registration
/// call-site.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Walks `root` and returns every file matching `pattern` whose contents contain
/// `call_site_marker` (e.g. `"register("`). Files that fail to read are logged at `warn`
/// and skipped — discovery always continues per the error-handling contract.
pub fn discover(root: &Path, pattern: &DiscoveryPattern, call_site_marker: &str) -> Vec<DiscoveredFile> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if !pattern.matches(relative) {
            continue;
        }
        match std::fs::read_to_string(entry.path()) {
            Ok(contents) => {
                if contents.contains(call_site_marker) {
                    found.push(DiscoveredFile {
                        path: entry.path().to_path_buf(),
                        contents,
                    });
                }
            }
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "failed to read candidate file during discovery, skipping");
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_star_matches_any_depth() {
        assert!(glob_match("core/plugin/**/*plugin.rs", "core/plugin/a/b/my-plugin.rs"));
        assert!(glob_match("core/plugin/**/*plugin.rs", "core/plugin/my-plugin.rs"));
        assert!(!glob_match("core/plugin/**/*plugin.rs", "core/other/my-plugin.rs"));
    }

    #[test]
    fn leading_wildcard_matches_the_spec_s_file_suffix_patterns() {
        assert!(glob_match("*plugin.rs", "my-plugin.rs"));
        assert!(glob_match("**/*middleware.rs", "core/middleware/cors-middleware.rs"));
        assert!(!glob_match("*plugin.rs", "my-plugin.ts"));
    }

    #[test]
    fn exclude_pattern_wins_over_positive_match() {
        let pattern = DiscoveryPattern::new("**/*plugin.rs").excluding("**/assets/**");
        assert!(!pattern.matches(Path::new("app/assets/foo-plugin.rs")));
        assert!(pattern.matches(Path::new("app/modules/foo-plugin.rs")));
    }

    #[test]
    fn discover_skips_files_without_the_call_site_marker() {
        let dir = tempdir();
        std::fs::write(dir.join("a-plugin.rs"), "register(plugin, true);").unwrap();
        std::fs::write(dir.join("b-plugin.rs"), "// no registration here").unwrap();

        let pattern = DiscoveryPattern::new("*plugin.rs");
        let found = discover(&dir, &pattern, "register(");
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("a-plugin.rs"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("runtime-plugins-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
