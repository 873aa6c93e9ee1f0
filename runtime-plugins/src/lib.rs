//! The plugin catalog: filesystem discovery, registration with semver gating, database
//! reconciliation, lifecycle hook firing, migrations, and asset publishing.

pub mod assets;
pub mod catalog;
pub mod discovery;
pub mod migration;
pub mod plugin;
pub mod storage;

pub use assets::{add_meta_asset, default_filename_transform, publish, set_meta_asset, MetaAsset};
pub use catalog::{hook_names, Catalog};
pub use discovery::{discover, DiscoveredFile, DiscoveryPattern};
pub use migration::MigrationSet;
pub use plugin::{Plugin, PluginMeta, PluginVersion};
