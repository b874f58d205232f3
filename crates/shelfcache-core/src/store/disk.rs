//! File-backed cache store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<generation>/<sha256 of request key>.record
//! ```
//!
//! A record file is one line of JSON metadata (request, status, headers,
//! `stored_at`) followed by the raw body. Records are written to a temp file
//! and renamed into place, so a reader sees either the old or the new record.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::{RequestKey, ResourceResponse};

use super::{CacheHandle, CacheRecord, CacheStore, RecordInfo};

const RECORD_EXTENSION: &str = "record";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    pub fn new(root: PathBuf) -> StoreResult<Self> {
        std::fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> StoreResult<PathBuf> {
        validate_generation_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Generation names become directory names, so they must be a single plain
/// path component. Leading dots are reserved for temp files.
fn validate_generation_name(name: &str) -> StoreResult<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0' | ':'));
    if invalid {
        Err(StoreError::InvalidGenerationName(name.to_string()))
    } else {
        Ok(())
    }
}

fn record_stem(key: &RequestKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(key.url.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    type Handle = DiskCache;

    async fn open(&self, name: &str) -> StoreResult<DiskCache> {
        let dir = self.generation_dir(name)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        Ok(DiskCache {
            generation: name.to_string(),
            dir,
        })
    }

    async fn open_existing(&self, name: &str) -> StoreResult<Option<DiskCache>> {
        let dir = self.generation_dir(name)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Some(DiskCache {
                generation: name.to_string(),
                dir,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    async fn list_generation_names(&self) -> StoreResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_generation_name(name).is_ok() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn delete_generation(&self, name: &str) -> StoreResult<bool> {
        let dir = self.generation_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }
}

/// Handle to one generation directory of a [`DiskCacheStore`].
#[derive(Debug, Clone)]
pub struct DiskCache {
    generation: String,
    dir: PathBuf,
}

impl DiskCache {
    fn record_path(&self, key: &RequestKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", record_stem(key), RECORD_EXTENSION))
    }

    fn temp_path(&self, key: &RequestKey) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}-{}.tmp",
            record_stem(key),
            std::process::id(),
            n
        ))
    }

    async fn read_record(&self, path: &Path) -> StoreResult<Option<CacheRecord>> {
        let contents = match tokio::fs::read(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        decode_record(path, contents).map(Some)
    }
}

fn encode_record(path: &Path, record: &CacheRecord) -> StoreResult<Vec<u8>> {
    // serde_json escapes newlines inside strings, so the header is one line
    let mut out = serde_json::to_vec(record).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;
    out.push(b'\n');
    out.extend_from_slice(&record.response.body);
    Ok(out)
}

fn decode_record(path: &Path, mut contents: Vec<u8>) -> StoreResult<CacheRecord> {
    let split = contents.iter().position(|&b| b == b'\n').ok_or_else(|| {
        StoreError::io(
            path,
            std::io::Error::new(ErrorKind::InvalidData, "record has no header line"),
        )
    })?;
    let body = contents.split_off(split + 1);
    let mut record: CacheRecord =
        serde_json::from_slice(&contents[..split]).map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;
    record.response.body = body;
    Ok(record)
}

#[async_trait]
impl CacheHandle for DiskCache {
    async fn match_request(&self, request: &RequestKey) -> StoreResult<Option<ResourceResponse>> {
        if !request.method.is_cacheable() {
            return Ok(None);
        }
        let path = self.record_path(request);
        let record = self.read_record(&path).await?;
        // Hash collisions are not trusted
        Ok(record
            .filter(|r| &r.request == request)
            .map(|r| r.response))
    }

    async fn put(&self, request: RequestKey, response: ResourceResponse) -> StoreResult<()> {
        if !request.method.is_cacheable() {
            return Err(StoreError::MethodNotCacheable(request.method.to_string()));
        }

        let path = self.record_path(&request);
        let temp = self.temp_path(&request);
        let record = CacheRecord::new(request, response);
        let contents = encode_record(&path, &record)?;

        match tokio::fs::write(&temp, contents).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::GenerationMissing(self.generation.clone()));
            }
            Err(e) => return Err(StoreError::io(&temp, e)),
        }

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StoreError::io(&path, e));
        }

        debug!(generation = %self.generation, request = %record.request, "Stored cache record");
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<RecordInfo>> {
        let mut infos = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::GenerationMissing(self.generation.clone()));
            }
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match self.read_record(&path).await {
                Ok(Some(record)) => infos.push(record.info()),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache record");
                }
            }
        }

        infos.sort_by(|a, b| a.request.cmp(&b.request));
        Ok(infos)
    }
}
