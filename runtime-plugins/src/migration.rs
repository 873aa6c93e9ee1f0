//! The `update` migration helper: a higher-order helper that runs migrations for every
//! version between an old and new plugin version, in ascending semver order.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use semver::Version;
use serde_json::Value;

type MigrationFn = Box<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Value> + Send>> + Send + Sync,
>;

/// One version's migration step, plus its optional `test` predicate (defaults to
/// `new_version > old_version` when absent).
pub struct MigrationStep {
    pub test: Option<Box<dyn Fn(&Version, &Version) -> bool + Send + Sync>>,
    pub migration: MigrationFn,
}

/// Ordered-by-semver collection of migration steps for a single plugin.
#[derive(Default)]
pub struct MigrationSet {
    steps: BTreeMap<Version, MigrationStep>,
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, version: &str, migration: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let parsed = Version::parse(version).expect("migration version must be valid semver");
        self.steps.insert(
            parsed,
            MigrationStep {
                test: None,
                migration: Box::new(move |current| Box::pin(migration(current))),
            },
        );
    }

    /// Runs every step whose version's `test` (default `version > old`) holds, in
    /// ascending order, awaiting each in turn and threading the mutated state through.
    pub async fn run(&self, old: &Version, new: &Version, mut current: Value) -> Value {
        for (version, step) in self.steps.range(..=new.clone()) {
            let should_run = match &step.test {
                Some(test) => test(version, old),
                None => version > old,
            };
            if should_run {
                current = (step.migration)(current).await;
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_migrations_in_ascending_order_between_old_and_new() {
        let mut set = MigrationSet::new();
        set.register("1.0.4", |v| async move {
            let mut v = v;
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("1.0.4"));
            v
        });
        set.register("1.0.5", |v| async move {
            let mut v = v;
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("1.0.5"));
            v
        });
        set.register("1.0.6", |v| async move {
            let mut v = v;
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("1.0.6"));
            v
        });

        let old = Version::parse("1.0.3").unwrap();
        let new = Version::parse("1.0.6").unwrap();
        let result = set.run(&old, &new, serde_json::json!({"touched": []})).await;

        assert_eq!(
            result["touched"],
            serde_json::json!(["1.0.4", "1.0.5", "1.0.6"])
        );
    }

    #[tokio::test]
    async fn skips_migrations_at_or_below_the_old_version() {
        let mut set = MigrationSet::new();
        set.register("1.0.0", |v| async move {
            let mut v = v;
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("1.0.0"));
            v
        });
        set.register("2.0.0", |v| async move {
            let mut v = v;
            v["touched"].as_array_mut().unwrap().push(serde_json::json!("2.0.0"));
            v
        });

        let old = Version::parse("1.0.0").unwrap();
        let new = Version::parse("2.0.0").unwrap();
        let result = set.run(&old, &new, serde_json::json!({"touched": []})).await;

        assert_eq!(result["touched"], serde_json::json!(["2.0.0"]));
    }
}
