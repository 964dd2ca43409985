//! File-based store: one payload file and one JSON metadata file per entry

use super::{MediaStore, Result};
use crate::types::{CacheEntry, EntryMeta};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const PAYLOAD_EXT: &str = "bin";
const META_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Stores each entry under `dir` as `<sha256(key)>.bin` + `<sha256(key)>.json`
///
/// The payload is written before the metadata, so any record visible to
/// [`MediaStore::list_all`] has its payload on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem for a cache key
    pub fn entry_id(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::entry_id(key), PAYLOAD_EXT))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::entry_id(key), META_EXT))
    }

    async fn read_meta(&self, path: &Path) -> Result<Option<EntryMeta>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temp file and rename, so readers never see a torn file
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".");
        tmp.push(TEMP_EXT);
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn exists(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl MediaStore for FileStore {
    async fn open(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        info!(cache_dir = ?self.dir, "File store opened");
        Ok(())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let payload_path = self.payload_path(&entry.key);
        // Drop stale metadata first so a crash mid-write cannot pair old
        // metadata with a new payload.
        remove_if_exists(&self.meta_path(&entry.key)).await?;
        self.write_atomic(&payload_path, &entry.payload).await?;

        let meta = serde_json::to_vec(&entry.meta())?;
        self.write_atomic(&self.meta_path(&entry.key), &meta).await?;

        debug!(key = %entry.key, size = entry.size_bytes, "Stored media file");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(meta) = self.read_meta(&self.meta_path(key)).await? else {
            return Ok(None);
        };

        let payload = match fs::read(self.payload_path(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(key = %key, "Metadata without payload, treating as missing");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if payload.len() as u64 != meta.size_bytes {
            warn!(
                key = %key,
                expected = meta.size_bytes,
                actual = payload.len(),
                "Stored payload size mismatch, treating as missing"
            );
            return Ok(None);
        }

        Ok(Some(CacheEntry::from_parts(meta, Bytes::from(payload))))
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(exists(&self.meta_path(key)).await? && exists(&self.payload_path(key)).await?)
    }

    async fn touch(&self, key: &str, recency: u64) -> Result<()> {
        let path = self.meta_path(key);
        let Some(mut meta) = self.read_meta(&path).await? else {
            return Ok(());
        };
        if !exists(&self.payload_path(key)).await? {
            return Ok(());
        }
        meta.recency = recency;
        self.write_atomic(&path, &serde_json::to_vec(&meta)?).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_if_exists(&self.meta_path(key)).await?;
        remove_if_exists(&self.payload_path(key)).await
    }

    async fn list_all(&self) -> Result<Vec<EntryMeta>> {
        let mut metas = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }

            let meta = match self.read_meta(&path).await {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Skipping unreadable cache metadata");
                    continue;
                }
            };

            if !exists(&self.payload_path(&meta.key)).await? {
                warn!(key = %meta.key, "Skipping cache metadata without payload");
                continue;
            }
            metas.push(meta);
        }

        Ok(metas)
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let owned = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(PAYLOAD_EXT | META_EXT | TEMP_EXT)
            );
            if owned {
                remove_if_exists(&path).await?;
                removed += 1;
            }
        }

        debug!(cache_dir = ?self.dir, removed, "Cleared file store");
        Ok(())
    }
}
