//! Model sources and acquisition
//!
//! A [`ModelLoader`] resolves a variant's [`ModelConfig`] into raw weight
//! bytes: cache first, then the primary source, then (once) the fallback.

use crate::cache::{validate_model_bytes, ModelCache};
use crate::config::ModelConfig;
use crate::download::DownloadProgressSender;
use crate::error::{BgRemovalError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Where model weights come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// HTTP(S) download
    Url(String),
    /// Local file
    File(PathBuf),
}

impl ModelSource {
    /// Interpret a user-supplied string as a URL or a path
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("https://") || value.starts_with("http://") {
            Self::Url(value.to_string())
        } else {
            Self::File(PathBuf::from(value))
        }
    }

    /// Stable key used for the model cache
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::File(path) => format!("file://{}", path.display()),
        }
    }

    /// Whether fetching this source goes over the network
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Url(_))
    }

    /// Short name for progress messages (last path segment)
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Url(url) => url
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or(url)
                .to_string(),
            Self::File(path) => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Retrieves raw model bytes from a source
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Fetch the full model, reporting `(loaded, total)` progress when a sender is given
    async fn fetch(
        &self,
        source: &ModelSource,
        progress: Option<&DownloadProgressSender>,
    ) -> Result<Vec<u8>>;
}

/// Cache-aware model acquisition with a single source fallback
pub struct ModelLoader {
    fetcher: Arc<dyn ModelFetcher>,
    cache: Option<Arc<dyn ModelCache>>,
    min_size: usize,
}

impl ModelLoader {
    /// Create a loader; `cache == None` always fetches
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn ModelFetcher>,
        cache: Option<Arc<dyn ModelCache>>,
        min_size: usize,
    ) -> Self {
        Self {
            fetcher,
            cache,
            min_size,
        }
    }

    /// Minimum plausible model size enforced by this loader
    #[must_use]
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Load validated weights for a model configuration
    ///
    /// Tries the primary source and, if that fails, the fallback exactly once.
    ///
    /// # Errors
    /// An initialization-class error (`Init`, `CorruptModel` or `Network`)
    /// describing the last failure
    pub async fn load(
        &self,
        config: &ModelConfig,
        progress: Option<&DownloadProgressSender>,
    ) -> Result<Vec<u8>> {
        let primary_error = match self.load_source(&config.primary, progress).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };

        let Some(fallback) = &config.fallback else {
            return Err(Self::as_init_error(&config.primary, primary_error));
        };

        log::warn!(
            "Model source {} failed ({}), trying fallback {}",
            config.primary,
            primary_error,
            fallback
        );
        self.load_source(fallback, progress)
            .await
            .map_err(|e| Self::as_init_error(fallback, e))
    }

    async fn load_source(
        &self,
        source: &ModelSource,
        progress: Option<&DownloadProgressSender>,
    ) -> Result<Vec<u8>> {
        let key = source.cache_key();
        let cache = self.cache.as_ref().filter(|_| source.is_remote());

        if let Some(cache) = cache {
            match cache.get(&key).await {
                Ok(Some(bytes)) => match validate_model_bytes(&bytes, self.min_size) {
                    Ok(()) => {
                        log::info!("Using cached model for {}", source);
                        return Ok(bytes);
                    },
                    Err(e) => {
                        log::warn!("Discarding invalid cached model for {}: {}", source, e);
                        Self::evict(cache.as_ref(), &key).await;
                    },
                },
                Ok(None) => log::debug!("No cached model for {}", source),
                Err(e) => {
                    log::warn!("Cache read failed for {}, refetching: {}", source, e);
                    Self::evict(cache.as_ref(), &key).await;
                },
            }
        }

        let bytes = self.fetcher.fetch(source, progress).await?;
        validate_model_bytes(&bytes, self.min_size)?;

        if let Some(cache) = cache {
            if let Err(e) = cache.set(&key, &bytes).await {
                log::warn!("Failed to cache model from {}: {}", source, e);
            }
        }

        Ok(bytes)
    }

    async fn evict(cache: &dyn ModelCache, key: &str) {
        if let Err(e) = cache.remove(key).await {
            log::debug!("Failed to evict cache entry {}: {}", key, e);
        }
    }

    fn as_init_error(source: &ModelSource, error: BgRemovalError) -> BgRemovalError {
        if error.is_init_error() {
            error
        } else {
            BgRemovalError::init(format!("Failed to load model from {}: {}", source, error))
        }
    }
}
