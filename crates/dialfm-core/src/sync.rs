//! Content-addressed sync of the local recordings cache.
//!
//! A sync fetches the remote manifest, compares every listed file's digest
//! with the bytes actually on disk, downloads whatever differs, and persists
//! the remote manifest as the new local copy. Each file succeeds or fails on
//! its own. If the remote manifest cannot be fetched the local manifest is
//! handed back untouched and the caller decides when to retry.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use md5::{Digest, Md5};
use reqwest::{Client, Url};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::catalog::FrequencyIndex;
use crate::config::RemoteConfig;
use crate::credentials::Credentials;
use crate::error::{RadioError, Result};
use crate::manifest::{temp_path_for, validate_relative_path, ContentHash, FileEntry, SyncManifest};

const HASH_CHUNK: usize = 64 * 1024;

/// Where station manifests and recording bytes come from.
pub trait RemoteCatalog {
    fn fetch_manifest(&self) -> impl Future<Output = Result<SyncManifest>> + Send;

    /// Write the bytes at `path` to `dest` and return their digest.
    fn fetch_file(
        &self,
        path: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<ContentHash>> + Send;
}

// ── HTTP catalog ──────────────────────────────────────────────────────────────

/// The catalog server: `GET <host>/<base_path>` lists stations, and
/// `GET <host>/<base_path>/<path>` serves a file. Basic auth on both.
pub struct HttpCatalog {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

impl HttpCatalog {
    pub fn new(remote: &RemoteConfig, credentials: &Credentials) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(remote.connect_timeout_secs))
            .timeout(Duration::from_secs(remote.request_timeout_secs))
            .build()?;

        let mut base = Url::parse(&remote.host)
            .map_err(|e| RadioError::Config(format!("invalid host {:?}: {}", remote.host, e)))?;
        {
            let mut segments = base.path_segments_mut().map_err(|_| {
                RadioError::Config(format!("host {:?} cannot carry a path", remote.host))
            })?;
            segments.pop_if_empty();
            segments.extend(remote.base_path.split('/').filter(|s| !s.is_empty()));
        }

        Ok(Self {
            client,
            base,
            username: remote.username.clone(),
            password: credentials.password.clone(),
        })
    }

    pub fn manifest_url(&self) -> &Url {
        &self.base
    }

    /// Each `/`-separated part of `path` becomes one escaped URL segment.
    pub fn file_url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(path.split('/'));
        }
        url
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp)
    }
}

impl RemoteCatalog for HttpCatalog {
    async fn fetch_manifest(&self) -> Result<SyncManifest> {
        debug!("sync: fetching manifest from {}", self.base);
        let body = self.get(self.base.clone()).await?.text().await?;
        SyncManifest::from_remote_json(&body)
    }

    async fn fetch_file(&self, path: &str, dest: &Path) -> Result<ContentHash> {
        let resp = self.get(self.file_url(path)).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Md5::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(finish(hasher))
    }
}

// ── in-memory catalog ─────────────────────────────────────────────────────────

/// A catalog served from memory. Stands in for the server in tests and
/// records which files were requested.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    manifest: Option<SyncManifest>,
    files: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    /// Every request fails with a network error.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn serving(
        manifest: SyncManifest,
        files: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Self {
        Self {
            manifest: Some(manifest),
            files: files.into_iter().collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Paths requested through `fetch_file`, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl RemoteCatalog for MemoryCatalog {
    async fn fetch_manifest(&self) -> Result<SyncManifest> {
        self.manifest
            .clone()
            .ok_or_else(|| RadioError::Network("catalog offline".into()))
    }

    async fn fetch_file(&self, path: &str, dest: &Path) -> Result<ContentHash> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(path.to_string());
        }
        let bytes = self
            .files
            .get(path)
            .ok_or_else(|| RadioError::Network(format!("404 Not Found: {}", path)))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(hash_bytes(bytes))
    }
}

// ── hashing ───────────────────────────────────────────────────────────────────

fn finish(hasher: Md5) -> ContentHash {
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    ContentHash(digest)
}

pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    finish(hasher)
}

/// Digest of the file at `path`, read in fixed chunks.
pub async fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(finish(hasher))
}

// ── engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct SyncOutcome {
    /// The manifest to carry into the next sync.
    pub manifest: SyncManifest,
    /// Freshly built from `manifest`. `None` when the remote was unreachable
    /// and nothing changed.
    pub index: Option<Arc<FrequencyIndex>>,
    pub report: SyncReport,
    /// Why the remote manifest could not be fetched.
    pub remote_error: Option<RadioError>,
}

impl SyncOutcome {
    pub fn remote_reached(&self) -> bool {
        self.remote_error.is_none()
    }
}

enum FileSync {
    Unchanged,
    Downloaded,
}

pub struct SyncEngine<R> {
    remote: R,
    cache_root: PathBuf,
    manifest_path: PathBuf,
}

impl<R: RemoteCatalog> SyncEngine<R> {
    pub fn new(remote: R, cache_root: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            cache_root: cache_root.into(),
            manifest_path: manifest_path.into(),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// The persisted manifest, or an empty one.
    pub fn load_local(&self) -> SyncManifest {
        SyncManifest::load(&self.manifest_path)
    }

    /// Fetch the remote manifest and reconcile `local` against it.
    pub async fn sync(&self, local: SyncManifest) -> SyncOutcome {
        let remote = self.remote.fetch_manifest().await;
        self.reconcile(local, remote).await
    }

    pub async fn reconcile(&self, local: SyncManifest, remote: Result<SyncManifest>) -> SyncOutcome {
        let remote = match remote {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    "sync: remote catalog unavailable, keeping {} cached files: {}",
                    local.file_count(),
                    e
                );
                return SyncOutcome {
                    manifest: local,
                    index: None,
                    report: SyncReport::default(),
                    remote_error: Some(e),
                };
            }
        };

        let mut report = SyncReport::default();
        for file in remote.files() {
            match self.sync_file(file).await {
                Ok(FileSync::Unchanged) => report.unchanged += 1,
                Ok(FileSync::Downloaded) => report.downloaded += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("sync: {} not updated: {}", file.path, e);
                }
            }
        }
        info!(
            "sync: {} stations, {} downloaded, {} unchanged, {} failed",
            remote.stations.len(),
            report.downloaded,
            report.unchanged,
            report.failed
        );

        if let Err(e) = remote.save(&self.manifest_path).await {
            warn!(
                "sync: could not persist manifest to {}: {}",
                self.manifest_path.display(),
                e
            );
        }

        let index = Arc::new(FrequencyIndex::build(&remote.stations));
        SyncOutcome {
            manifest: remote,
            index: Some(index),
            report,
            remote_error: None,
        }
    }

    async fn sync_file(&self, file: &FileEntry) -> Result<FileSync> {
        validate_relative_path(&file.path)?;
        let dest = self.cache_root.join(&file.path);

        match hash_file(&dest).await {
            Ok(local) if local == file.hash => return Ok(FileSync::Unchanged),
            Ok(local) => debug!(
                "sync: {}",
                RadioError::IntegrityMismatch {
                    path: file.path.clone(),
                    expected: file.hash.to_hex(),
                    actual: local.to_hex(),
                }
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("sync: {} not cached yet", file.path)
            }
            Err(e) => return Err(e.into()),
        }

        self.download(file, &dest).await?;
        Ok(FileSync::Downloaded)
    }

    /// Fetch into a sibling temp file, verify, then rename over `dest`.
    async fn download(&self, file: &FileEntry, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path_for(dest);

        let actual = match self.remote.fetch_file(&file.path, &tmp).await {
            Ok(hash) => hash,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        };
        if actual != file.hash {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RadioError::IntegrityMismatch {
                path: file.path.clone(),
                expected: file.hash.to_hex(),
                actual: actual.to_hex(),
            });
        }
        if let Err(e) = tokio::fs::rename(&tmp, dest).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        info!("sync: downloaded {}", file.path);
        Ok(())
    }
}
