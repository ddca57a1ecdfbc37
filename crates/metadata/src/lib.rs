//! Provider metadata store for the Terrapin provider mirror.
//!
//! A durable, transactional view over the hierarchical provider namespace,
//! backed by a single embedded database file:
//!
//! ```text
//! providers:  "host/namespace/type"                      -> modified (RFC3339)
//! versions:   ("host/namespace/type", version)           -> raw upstream JSON
//! platforms:  ("host/namespace/type", version, "os/arch") -> (modified, raw upstream JSON)
//! ```
//!
//! Values are the raw JSON objects the upstream registry returned. Readers
//! get owned copies; the backing pages may be unmapped once the read
//! transaction closes.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ProviderStore, StoreStats};
