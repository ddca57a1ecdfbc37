//! Archive resolution and the single-flight download barrier.

use crate::download::{DownloadClient, FetchOptions};
use crate::error::ArchiveResult;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

/// Chunk size for streaming archive reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Streaming archive body.
pub type ByteStream = Pin<Box<dyn futures::Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Options for loading one archive.
#[derive(Clone, Debug)]
pub struct LoadArchiveOptions {
    pub hostname: String,
    pub namespace: String,
    pub type_name: String,
    pub filename: String,
    pub shasum: String,
    pub download_url: String,
}

/// A streaming archive response.
pub struct Archive {
    pub content_type: &'static str,
    pub content_length: u64,
    pub filename: String,
    pub body: ByteStream,
}

/// Content-addressed archive store over the providers directory tree.
///
/// Writes are guarded by a per-directory download slot; reads are unguarded
/// because files are written once and renamed into place atomically.
pub struct ArchiveStore {
    explicit_dir: PathBuf,
    implied_dir: Option<PathBuf>,
    client: DownloadClient,
    slots: Arc<DashMap<PathBuf, watch::Sender<bool>>>,
}

impl ArchiveStore {
    /// Create a store rooted at `explicit_dir`, optionally consulting a
    /// curated read-only `implied_dir` first.
    pub fn new(
        explicit_dir: impl Into<PathBuf>,
        implied_dir: Option<PathBuf>,
        client: DownloadClient,
    ) -> ArchiveResult<Self> {
        let explicit_dir = explicit_dir.into();
        std::fs::create_dir_all(&explicit_dir)?;

        Ok(Self {
            explicit_dir,
            implied_dir,
            client,
            slots: Arc::new(DashMap::new()),
        })
    }

    /// Load an archive, pulling it through from upstream when absent.
    ///
    /// Concurrent loads of the same provider directory coalesce onto one
    /// download; waiters re-resolve from disk once the owner finishes.
    pub async fn load(&self, opts: &LoadArchiveOptions) -> ArchiveResult<Archive> {
        loop {
            // The implied tree is curated by the operator and trusted as-is.
            if let Some(implied) = &self.implied_dir {
                let path = implied
                    .join(&opts.hostname)
                    .join(&opts.namespace)
                    .join(&opts.type_name)
                    .join(&opts.filename);

                match fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() => {
                        return open_archive(&path, meta.len(), &opts.filename).await;
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }

            let dir = self
                .explicit_dir
                .join(&opts.hostname)
                .join(&opts.namespace)
                .join(&opts.type_name);
            let path = dir.join(&opts.filename);

            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {
                    return open_archive(&path, meta.len(), &opts.filename).await;
                }
                Ok(_) => {
                    // A directory where the archive should be; clear it out
                    // and fetch.
                    fs::remove_dir_all(&path).await?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    fs::create_dir_all(&dir).await?;
                }
                Err(e) => return Err(e.into()),
            }

            // Acquire the per-directory download slot, or wait for its
            // owner and re-resolve.
            let guard = match self.slots.entry(dir.clone()) {
                Entry::Occupied(occupied) => {
                    let mut done = occupied.get().subscribe();
                    drop(occupied);
                    let _ = done.wait_for(|finished| *finished).await;
                    continue;
                }
                Entry::Vacant(vacant) => {
                    let (tx, _) = watch::channel(false);
                    vacant.insert(tx);
                    SlotGuard {
                        slots: self.slots.clone(),
                        key: dir,
                    }
                }
            };

            let fetch = FetchOptions {
                download_url: opts.download_url.clone(),
                directory: guard.key.clone(),
                filename: opts.filename.clone(),
                shasum: opts.shasum.clone(),
            };

            let result = self.client.fetch(&fetch).await;
            drop(guard);
            result?;
        }
    }
}

/// Releases a download slot and wakes its waiters, whatever the outcome.
struct SlotGuard {
    slots: Arc<DashMap<PathBuf, watch::Sender<bool>>>,
    key: PathBuf,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some((_, tx)) = self.slots.remove(&self.key) {
            let _ = tx.send(true);
        }
    }
}

async fn open_archive(path: &Path, len: u64, filename: &str) -> ArchiveResult<Archive> {
    let file = fs::File::open(path).await?;

    let body = async_stream::try_stream! {
        let mut file = file;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };

    Ok(Archive {
        content_type: "application/zip",
        content_length: len,
        filename: filename.to_string(),
        body: Box::pin(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use sha2::{Digest, Sha256};
    use tempfile::tempdir;

    fn sha256_hex(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn load_options(server: &MockServer, shasum: String) -> LoadArchiveOptions {
        LoadArchiveOptions {
            hostname: "registry.terraform.io".to_string(),
            namespace: "hashicorp".to_string(),
            type_name: "random".to_string(),
            filename: "terraform-provider-random_3.6.0_linux_amd64.zip".to_string(),
            shasum,
            download_url: server.url("/releases/terraform-provider-random_3.6.0_linux_amd64.zip"),
        }
    }

    async fn collect(mut body: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn load_fetches_then_serves_from_disk() {
        let server = MockServer::start();
        let body = b"zip bytes".to_vec();
        let get = server.mock(|when, then| {
            when.method(GET)
                .path("/releases/terraform-provider-random_3.6.0_linux_amd64.zip");
            then.status(200).body(&body);
        });

        let dir = tempdir().unwrap();
        let store = ArchiveStore::new(
            dir.path().join("providers"),
            None,
            DownloadClient::new(reqwest::Client::new()).with_parallelism(1),
        )
        .unwrap();
        let opts = load_options(&server, sha256_hex(&body));

        let archive = store.load(&opts).await.unwrap();
        assert_eq!(archive.content_type, "application/zip");
        assert_eq!(archive.content_length, body.len() as u64);
        assert_eq!(collect(archive.body).await, body);
        assert_eq!(get.hits(), 1);

        // Second load is a pure disk hit.
        let archive = store.load(&opts).await.unwrap();
        assert_eq!(collect(archive.body).await, body);
        assert_eq!(get.hits(), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_download() {
        let server = MockServer::start();
        let body: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 239) as u8).collect();
        let get = server.mock(|when, then| {
            when.method(GET)
                .path("/releases/terraform-provider-random_3.6.0_linux_amd64.zip");
            then.status(200).body(&body);
        });

        let dir = tempdir().unwrap();
        let store = Arc::new(
            ArchiveStore::new(
                dir.path().join("providers"),
                None,
                DownloadClient::new(reqwest::Client::new()).with_parallelism(1),
            )
            .unwrap(),
        );
        let opts = load_options(&server, sha256_hex(&body));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let opts = opts.clone();
            tasks.push(tokio::spawn(async move {
                let archive = store.load(&opts).await.unwrap();
                collect(archive.body).await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), body);
        }
        assert_eq!(get.hits(), 1);
    }

    #[tokio::test]
    async fn implied_directory_wins_without_verification() {
        let server = MockServer::start();
        let get = server.mock(|when, then| {
            when.method(GET)
                .path("/releases/terraform-provider-random_3.6.0_linux_amd64.zip");
            then.status(200).body("should not be fetched");
        });

        let dir = tempdir().unwrap();
        let implied = dir.path().join("implied");
        let curated = implied
            .join("registry.terraform.io")
            .join("hashicorp")
            .join("random");
        std::fs::create_dir_all(&curated).unwrap();
        std::fs::write(
            curated.join("terraform-provider-random_3.6.0_linux_amd64.zip"),
            b"curated bytes",
        )
        .unwrap();

        let store = ArchiveStore::new(
            dir.path().join("providers"),
            Some(implied),
            DownloadClient::new(reqwest::Client::new()).with_parallelism(1),
        )
        .unwrap();
        // Shasum deliberately wrong for the curated bytes; it must not be
        // checked.
        let opts = load_options(&server, sha256_hex(b"something else"));

        let archive = store.load(&opts).await.unwrap();
        assert_eq!(collect(archive.body).await, b"curated bytes");
        assert_eq!(get.hits(), 0);
    }

    #[tokio::test]
    async fn directory_at_archive_path_is_replaced() {
        let server = MockServer::start();
        let body = b"replacement".to_vec();
        server.mock(|when, then| {
            when.method(GET)
                .path("/releases/terraform-provider-random_3.6.0_linux_amd64.zip");
            then.status(200).body(&body);
        });

        let dir = tempdir().unwrap();
        let providers = dir.path().join("providers");
        let bogus = providers
            .join("registry.terraform.io")
            .join("hashicorp")
            .join("random")
            .join("terraform-provider-random_3.6.0_linux_amd64.zip");
        std::fs::create_dir_all(&bogus).unwrap();

        let store = ArchiveStore::new(
            providers,
            None,
            DownloadClient::new(reqwest::Client::new()).with_parallelism(1),
        )
        .unwrap();
        let opts = load_options(&server, sha256_hex(&body));

        let archive = store.load(&opts).await.unwrap();
        assert_eq!(collect(archive.body).await, body);
    }

    #[tokio::test]
    async fn failed_download_surfaces_to_the_caller() {
        let server = MockServer::start();
        // No mock: the GET 404s.

        let dir = tempdir().unwrap();
        let store = ArchiveStore::new(
            dir.path().join("providers"),
            None,
            DownloadClient::new(reqwest::Client::new()).with_parallelism(1),
        )
        .unwrap();
        let opts = load_options(&server, String::new());

        assert!(store.load(&opts).await.is_err());
    }
}
