//! Upstream registry client and cache coordinator for the Terrapin
//! provider mirror.
//!
//! [`RegistryClient`] talks the upstream provider registry protocol:
//! service discovery plus conditional version/platform fetches.
//! [`MirrorService`] coordinates reads across the metadata store and the
//! upstream: demand-fill on miss, per-key in-flight coalescing, a
//! background sweep of the latest versions' platforms, and the periodic
//! full resync.

pub mod error;
pub mod service;
pub mod task;
pub mod upstream;

pub use error::{MirrorError, MirrorResult};
pub use service::MirrorService;
pub use task::spawn_resync_task;
pub use upstream::RegistryClient;
