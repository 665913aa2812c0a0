//! Model weight cache
//!
//! Stores raw model bytes keyed by their source (URL or path) so that weights
//! fetched once are reused across sessions. Buffers that cannot plausibly be
//! model weights are rejected before they are cached or loaded.

use crate::config::CACHE_DIR_ENV;
use crate::error::{BgRemovalError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// First line of a Git LFS pointer file served instead of the real object
const LFS_POINTER_PREFIX: &[u8] = b"version https://git-lfs.github.com/spec";

/// Reject buffers that cannot be real model weights
///
/// # Errors
/// `CorruptModel` when the buffer is a Git LFS pointer stub, an HTML page, or
/// smaller than `min_size`
pub fn validate_model_bytes(bytes: &[u8], min_size: usize) -> Result<()> {
    if bytes.starts_with(LFS_POINTER_PREFIX) {
        return Err(BgRemovalError::corrupt_model(
            "Received a Git LFS pointer instead of model weights",
        ));
    }

    let head = bytes
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(16)
        .map(u8::to_ascii_lowercase)
        .collect::<Vec<u8>>();
    if head.starts_with(b"<!doctype html") || head.starts_with(b"<html") {
        return Err(BgRemovalError::corrupt_model(
            "Received an HTML page instead of model weights",
        ));
    }

    if bytes.len() < min_size {
        return Err(BgRemovalError::corrupt_model(format!(
            "Model buffer of {} is below the plausible minimum of {}",
            format_size(bytes.len() as u64),
            format_size(min_size as u64)
        )));
    }

    Ok(())
}

/// Storage for raw model bytes keyed by source
#[async_trait]
pub trait ModelCache: Send + Sync {
    /// Fetch cached bytes, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under `key`, replacing any previous entry
    async fn set(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Drop an entry; returns whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// Sidecar metadata written next to every cached model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    /// Original cache key (model URL or path)
    pub key: String,
    /// Byte count of the stored model
    pub size_bytes: u64,
    /// Hex SHA-256 of the stored model
    pub sha256: String,
    /// When the entry was written
    pub cached_at: DateTime<Utc>,
}

/// Information about a cached model, for listing
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub cached_at: DateTime<Utc>,
}

/// File-system backed model cache
///
/// Layout: `<root>/models/<sha256(key)>.onnx` plus `<sha256(key)>.json`.
#[derive(Debug, Clone)]
pub struct FsModelCache {
    cache_dir: PathBuf,
}

impl FsModelCache {
    /// Open the cache at `root`, or at the default location when `None`
    ///
    /// The default honours `LOCAL_BGREMOVE_CACHE_DIR`, then falls back to the
    /// platform cache directory (`~/.cache/local-bgremove` on Linux).
    ///
    /// # Errors
    /// - No cache directory can be determined
    /// - The directory cannot be created
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let root = match root {
            Some(root) => root.to_path_buf(),
            None => Self::default_root()?,
        };
        let cache_dir = root.join("models");

        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    fn default_root() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            if !cache_override.trim().is_empty() {
                return Ok(PathBuf::from(cache_override));
            }
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join("local-bgremove"))
    }

    /// Directory holding the cached model files
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Stable, filesystem-safe identifier for a key
    #[must_use]
    pub fn key_to_id(key: &str) -> String {
        hex_digest(key.as_bytes())
    }

    fn entry_paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let id = Self::key_to_id(key);
        (
            self.cache_dir.join(format!("{}.onnx", id)),
            self.cache_dir.join(format!("{}.json", id)),
        )
    }

    async fn read_metadata(path: &Path) -> Result<CacheEntryMetadata> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("read cache metadata", path, &e))?;
        serde_json::from_str(&json).map_err(|e| {
            BgRemovalError::corrupt_model(format!(
                "Invalid cache metadata {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// List every complete cache entry, sorted by key
    ///
    /// # Errors
    /// Failed to read the cache directory
    pub async fn list_entries(&self) -> Result<Vec<CachedModelInfo>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await.map_err(|e| {
            BgRemovalError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match Self::read_metadata(&path).await {
                    Ok(meta) => entries.push(CachedModelInfo {
                        path: path.with_extension("onnx"),
                        key: meta.key,
                        size_bytes: meta.size_bytes,
                        cached_at: meta.cached_at,
                    }),
                    Err(e) => log::debug!("Skipping cache entry {}: {}", path.display(), e),
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove every cached model; returns the removed keys
    ///
    /// # Errors
    /// Failed to list or delete cache files
    pub async fn clear_all(&self) -> Result<Vec<String>> {
        let entries = self.list_entries().await?;
        let mut removed = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.remove(&entry.key).await? {
                log::info!("Removed cached model: {}", entry.key);
                removed.push(entry.key);
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ModelCache for FsModelCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (model_path, meta_path) = self.entry_paths(key);
        if !model_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let meta = Self::read_metadata(&meta_path).await?;
        let bytes = tokio::fs::read(&model_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("read cached model", &model_path, &e))?;

        if bytes.len() as u64 != meta.size_bytes || hex_digest(&bytes) != meta.sha256 {
            return Err(BgRemovalError::corrupt_model(format!(
                "Cached model for '{}' does not match its recorded checksum",
                key
            )));
        }

        log::debug!("Cache hit for {} ({})", key, format_size(meta.size_bytes));
        Ok(Some(bytes))
    }

    async fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let (model_path, meta_path) = self.entry_paths(key);
        let meta = CacheEntryMetadata {
            key: key.to_string(),
            size_bytes: bytes.len() as u64,
            sha256: hex_digest(bytes),
            cached_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| BgRemovalError::internal(format!("Failed to serialize cache metadata: {}", e)))?;

        // Write to a temp name first so readers never see a partial model
        let temp_path = model_path.with_extension("onnx.part");
        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(|e| BgRemovalError::file_io_error("write cached model", &temp_path, &e))?;
        tokio::fs::rename(&temp_path, &model_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("finalize cached model", &model_path, &e))?;
        tokio::fs::write(&meta_path, json)
            .await
            .map_err(|e| BgRemovalError::file_io_error("write cache metadata", &meta_path, &e))?;

        log::debug!("Cached {} ({})", key, format_size(meta.size_bytes));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let (model_path, meta_path) = self.entry_paths(key);
        let mut existed = false;
        for path in [&model_path, &meta_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => existed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(BgRemovalError::file_io_error("remove cache entry", path, &e)),
            }
        }
        Ok(existed)
    }
}

/// In-process cache, mostly for tests and embedding without a writable disk
#[derive(Debug, Default)]
pub struct MemoryModelCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryModelCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| BgRemovalError::internal("Model cache lock poisoned"))
    }
}

#[async_trait]
impl ModelCache for MemoryModelCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
