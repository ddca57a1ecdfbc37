//! Archive downloader with resumable range transfers.
//!
//! Downloads land in a `.<filename>` temp file next to the final path and
//! are renamed into place only after the shasum check passes. When the
//! remote advertises range support, the body is fetched in 2 MiB chunks
//! with up to 5 in flight; a failed range transfer keeps the temp file so
//! the next attempt can resume from its length.

use crate::error::{ArchiveError, ArchiveResult};
use futures::future::try_join_all;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

/// Range chunk size (2 MiB).
const PARTIAL_CHUNK: u64 = 2 * 1024 * 1024;

/// Concurrent range requests per window.
const PARALLEL: usize = 5;

/// Copy buffer for sequential transfers and hashing (1 MiB).
const COPY_BUFFER: usize = 1024 * 1024;

/// Options for fetching one archive.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub download_url: String,
    pub directory: PathBuf,
    pub filename: String,
    /// Lowercase hex SHA-256 of the complete archive. Empty means the
    /// upstream descriptor carried no hash and the bytes are accepted
    /// on receipt.
    pub shasum: String,
}

/// HTTP archive download client.
#[derive(Clone)]
pub struct DownloadClient {
    http: reqwest::Client,
    parallelism: usize,
}

impl DownloadClient {
    pub fn new(http: reqwest::Client) -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self { http, parallelism }
    }

    /// Override the CPU count used for the range-transfer decision.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Fetch one archive into `directory/filename`.
    ///
    /// Returns without transferring when a valid file already exists at the
    /// output path; a corrupt existing file is removed and re-fetched.
    pub async fn fetch(&self, opts: &FetchOptions) -> ArchiveResult<()> {
        if opts.download_url.is_empty() || opts.filename.is_empty() {
            return Err(ArchiveError::InvalidOptions(
                "download URL and filename are required".to_string(),
            ));
        }

        let mut output = opts.directory.join(&opts.filename);

        // An existing output wins if its hash matches; symlinks are
        // dereferenced so verification sees the real bytes.
        match fs::symlink_metadata(&output).await {
            Ok(meta) => {
                if meta.is_dir() {
                    return Err(ArchiveError::OutputIsDirectory(
                        output.display().to_string(),
                    ));
                }

                if meta.file_type().is_symlink() {
                    output = fs::read_link(&output).await?;
                }

                if verify_shasum(&output, &opts.shasum).await? {
                    return Ok(());
                }

                fs::remove_file(&output).await?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let temp_path = opts.directory.join(format!(".{}", opts.filename));
        let mut received = match fs::symlink_metadata(&temp_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(meta) => {
                // Not a regular file; start over.
                if meta.is_dir() {
                    fs::remove_dir_all(&temp_path).await?;
                } else {
                    fs::remove_file(&temp_path).await.or_else(ignore_not_found)?;
                }
                0
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        // Probe for range support. A failed probe just forces a sequential
        // transfer.
        let mut ranged = false;
        let mut content_length = 0u64;
        if let Ok(resp) = self.http.head(&opts.download_url).send().await
            && resp.status() == StatusCode::OK
        {
            // Read the header rather than Response::content_length(): a
            // HEAD response has no body, so the latter reports zero.
            content_length = resp
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            ranged = resp
                .headers()
                .get(ACCEPT_RANGES)
                .is_some_and(|v| v.as_bytes() == b"bytes")
                && content_length > 0
                && self.parallelism > 1;
        }

        // A leftover temp larger than the advertised length cannot be a
        // prefix of the content; discard it.
        if ranged && received > content_length {
            fs::remove_file(&temp_path).await.or_else(ignore_not_found)?;
            received = 0;
        }

        fs::create_dir_all(&opts.directory).await?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&temp_path)
            .await?;

        let result = if ranged {
            self.fetch_ranges(&opts.download_url, file, received, content_length)
                .await
        } else {
            self.fetch_sequential(&opts.download_url, file).await
        };

        if let Err(e) = result {
            // A partial range transfer is resumable; a broken sequential
            // transfer is not.
            if !ranged {
                fs::remove_file(&temp_path).await.or_else(ignore_not_found)?;
            }
            return Err(e);
        }

        if !opts.shasum.is_empty() {
            let actual = hash_file(&temp_path).await?;
            if actual != opts.shasum {
                fs::remove_file(&temp_path).await.or_else(ignore_not_found)?;
                return Err(ArchiveError::ShasumMismatch {
                    expected: opts.shasum.clone(),
                    actual,
                });
            }
        }

        fs::rename(&temp_path, &output).await?;

        Ok(())
    }

    async fn fetch_ranges(
        &self,
        url: &str,
        mut file: fs::File,
        received: u64,
        content_length: u64,
    ) -> ArchiveResult<()> {
        if received == content_length {
            return Ok(());
        }

        if received == 0 {
            file.set_len(content_length).await?;
        } else {
            file.seek(SeekFrom::End(0)).await?;
        }

        let mut ranges = Vec::new();
        let mut start = received;
        while start < content_length {
            let end = (start + PARTIAL_CHUNK).min(content_length);
            ranges.push((start, end));
            start = end;
        }

        tracing::debug!(url, received, content_length, "downloading ranges");

        for window in ranges.chunks(PARALLEL) {
            let parts = try_join_all(window.iter().map(|&(start, end)| {
                let http = self.http.clone();
                async move {
                    let resp = http
                        .get(url)
                        .header(RANGE, format!("bytes={}-{}", start, end - 1))
                        .send()
                        .await?;

                    if resp.status() != StatusCode::PARTIAL_CONTENT {
                        return Err(ArchiveError::UnexpectedStatus {
                            method: "range GET",
                            status: resp.status().as_u16(),
                        });
                    }

                    let body = resp.bytes().await?;
                    if body.len() as u64 != end - start {
                        return Err(ArchiveError::TruncatedRange {
                            start,
                            end: end - 1,
                            got: body.len() as u64,
                        });
                    }

                    tracing::trace!(url, start, end, "received range");

                    Ok(body)
                }
            }))
            .await?;

            for part in parts {
                file.write_all(&part).await?;
            }
        }

        file.flush().await?;

        tracing::debug!(url, "downloaded");

        Ok(())
    }

    async fn fetch_sequential(&self, url: &str, mut file: fs::File) -> ArchiveResult<()> {
        use futures::StreamExt;

        file.seek(SeekFrom::Start(0)).await?;

        tracing::debug!(url, "downloading");

        let resp = self.http.get(url).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(ArchiveError::UnexpectedStatus {
                method: "GET",
                status: resp.status().as_u16(),
            });
        }

        let mut writer = BufWriter::with_capacity(COPY_BUFFER, file);
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            writer.write_all(&chunk?).await?;
        }
        writer.flush().await?;

        tracing::debug!(url, "downloaded");

        Ok(())
    }
}

fn ignore_not_found(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

/// Compare a file's SHA-256 against an expected lowercase hex digest.
/// An empty expectation always matches.
async fn verify_shasum(path: &Path, shasum: &str) -> ArchiveResult<bool> {
    if shasum.is_empty() {
        return Ok(true);
    }

    Ok(hash_file(path).await? == shasum)
}

async fn hash_file(path: &Path) -> ArchiveResult<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUFFER];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}
