//! Core domain types and shared logic for the Terrapin provider mirror.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Provider addresses (hostname / namespace / type)
//! - The release archive filename grammar
//! - Typed views over upstream registry JSON payloads
//! - Configuration
//! - Duration parsing for request parameters

pub mod archive;
pub mod config;
pub mod duration;
pub mod error;
pub mod provider;

pub use archive::ArchiveName;
pub use config::AppConfig;
pub use duration::parse_duration;
pub use error::{Error, Result};
pub use provider::{PlatformData, PlatformKey, ProviderRef, VersionData};

/// Product name used in user agents and version endpoints.
pub const PRODUCT: &str = "terrapin";

/// User agent sent on every upstream request. Some registries use it for
/// rate-limit tiering.
pub const USER_AGENT: &str = concat!("terrapin/", env!("CARGO_PKG_VERSION"));
