//! HTTP request handlers.

pub mod measure;
pub mod mirror;

pub use measure::{livez, metrics_handler, readyz, version};
pub use mirror::{download_archive, get_metadata, sync_metadata};
