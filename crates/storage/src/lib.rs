//! Provider archive storage for the Terrapin provider mirror.
//!
//! Archives live in a content-addressed directory tree,
//! `<root>/<hostname>/<namespace>/<type>/<filename>`. Loads resolve from an
//! optional operator-curated implied tree first, then the mirror-managed
//! explicit tree, and finally pull through the downloader under a
//! per-directory single-flight barrier.

pub mod archive;
pub mod download;
pub mod error;

pub use archive::{Archive, ArchiveStore, ByteStream, LoadArchiveOptions};
pub use download::{DownloadClient, FetchOptions};
pub use error::{ArchiveError, ArchiveResult};
