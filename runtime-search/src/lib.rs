//! The search index coordinator: drives content types through the indexing pipeline on
//! a recurring schedule and brokers search requests to whichever indexer plugin is
//! registered for the `search` hook.

pub mod config;
pub mod coordinator;
pub mod normalize;
pub mod result;

pub use config::{IndexConfig, DEFAULT_INDEX_FREQUENCY};
pub use coordinator::SearchCoordinator;
pub use result::{SearchHit, SearchResults};
