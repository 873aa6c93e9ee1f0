//! Boot orchestrator: wires the hook engine, plugin catalog, task scheduler, storage
//! adapter, syndication service, and search coordinator into a single HTTP process.

use std::sync::Arc;

use anyhow::Context;
use runtime_api::gateway::FunctionGateway;
use runtime_api::middleware::MiddlewareChain;
use runtime_core::config::RuntimeConfig;
use runtime_core::{logging, HookEngine};
use runtime_plugins::catalog::Catalog;
use runtime_plugins::discovery::DiscoveryPattern;
use runtime_plugins::plugin::Plugin;
use runtime_search::SearchCoordinator;
use runtime_store::document::InMemoryStore;
use runtime_store::files::{DatabaseBlobAdapter, FilesAdapter, FilesAdapterProxy};
use runtime_syndication::Client as SyndicationClient;
use runtime_tasks::Scheduler;
use semver::Version;
use tracing::{error, info};

const RUNTIME_VERSION: &str = "1.0.0";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = RuntimeConfig::load().context("environment load failed")?;
    info!(config = ?config.redacted_snapshot(), "loaded runtime configuration");

    let hooks = Arc::new(HookEngine::new());
    let store: Arc<dyn runtime_store::document::DocumentStore> = Arc::new(InMemoryStore::default());
    let scheduler = Arc::new(Scheduler::new());
    let files = Arc::new(FilesAdapterProxy::default());

    let core_root = config.src_dir.join("core");
    let catalog = Arc::new(
        Catalog::new(
            Version::parse(RUNTIME_VERSION).expect("runtime version is a valid semver literal"),
            hooks.clone(),
            store.clone(),
        )
        .with_core_root(core_root.clone()),
    );

    // The core plugin installs the database-backed blob adapter as its storage backend on
    // activate, and the proxy falls back to its own built-in default the moment core is
    // deactivated — the same swap/revert contract any third-party storage plugin goes
    // through, exercised here by the runtime's own bundled subsystem.
    let core_storage_installer: runtime_store::AdapterInstaller =
        Arc::new(|_config, _env| Some(Arc::new(DatabaseBlobAdapter::default()) as Arc<dyn FilesAdapter>));
    runtime_plugins::storage::register(&hooks, files.clone(), "core", core_storage_installer, 0);

    // The runtime's own bundled subsystems (hook engine, scheduler, storage proxy) are
    // registered as a built-in plugin so they flow through the same install/schema/
    // activate lifecycle every third-party plugin does, rather than being special-cased.
    catalog
        .register(
            Plugin::new("core", "Pulsar Runtime Core", RUNTIME_VERSION)
                .with_description("Built-in core plugin bundling the hook engine, task scheduler, and storage proxy")
                .with_order(-1000),
            true,
            Some(core_root.join("plugin.rs").as_path()),
        )
        .context("failed to register the built-in core plugin")?;

    // Discover plugin-manifest-shaped files under the configured source root so boot logs
    // what third-party plugins are on disk, per the §6 discovery patterns. Nothing is
    // dynamically loaded from them — plugins register themselves by calling into this
    // same `Catalog` from compiled-in code.
    let plugin_pattern = DiscoveryPattern::new("**/*plugin.rs").excluding("**/assets/**");
    let discovered = runtime_plugins::discover(&config.src_dir, &plugin_pattern, "register(");
    info!(count = discovered.len(), root = %config.src_dir.display(), "plugin manifest discovery scan complete");

    catalog
        .sync_with_store()
        .await
        .context("failed to reconcile the plugin catalog with the persistent store")?;

    let syndication = Arc::new(SyndicationClient::new(
        &config.refresh_token_secret,
        &config.access_token_secret,
        store.clone(),
    ));

    let search = Arc::new(SearchCoordinator::new(hooks.clone(), store.clone(), scheduler.clone()));
    search.start(&[], None).await;

    let gateway = Arc::new(FunctionGateway::new(catalog.clone()));
    let middleware = MiddlewareChain::new();
    let router = runtime_api::build_router(gateway, syndication, middleware);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind to port {}", config.port))?;
    info!(server_uri = %config.server_uri, "runtime listening");

    let serve = axum::serve(listener, router);
    tokio::select! {
        result = serve => {
            if let Err(err) = result {
                error!(error = %err, "HTTP server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, stopping");
        }
    }

    for id in scheduler.ids() {
        scheduler.unregister(&id);
    }

    info!("runtime stopped");
    Ok(())
}
