//! Backend construction and per-variant sharing
//!
//! Each [`ModelKind`] gets at most one backend instance, created lazily on
//! first use and handed out as a shared, exclusively-locked handle so a
//! session is never driven by two requests at once.

use super::{BackendCore, GeneralSegmenter, PortraitSegmenter, SegmentationBackend};
use crate::backends::engine_for;
use crate::cache::{FsModelCache, ModelCache};
use crate::config::{ModelKind, RemovalConfig};
use crate::download::ModelDownloader;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceEngine;
use crate::models::ModelLoader;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Handle to the single backend instance of a variant
pub type SharedBackend = Arc<tokio::sync::Mutex<Box<dyn SegmentationBackend>>>;

/// Creates backends for model variants
pub trait BackendFactory: Send + Sync {
    /// Build an uninitialized backend for `kind`
    ///
    /// # Errors
    /// Engine unavailable in this build, or invalid configuration
    fn create(&self, kind: ModelKind) -> Result<Box<dyn SegmentationBackend>>;
}

/// Factory wiring configuration, model loader and inference engines together
pub struct DefaultBackendFactory {
    config: RemovalConfig,
    loader: Arc<ModelLoader>,
    engine_override: Option<Arc<dyn InferenceEngine>>,
}

impl DefaultBackendFactory {
    /// Build a factory with the filesystem cache and HTTP downloader
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Cache directory or HTTP client setup failures
    pub fn new(config: RemovalConfig) -> Result<Self> {
        config.validate()?;

        let cache: Option<Arc<dyn ModelCache>> = if config.disable_cache {
            log::debug!("Model cache disabled");
            None
        } else {
            Some(Arc::new(FsModelCache::new(config.cache_dir.as_deref())?))
        };
        let fetcher = Arc::new(ModelDownloader::new()?);
        let loader = ModelLoader::new(fetcher, cache, config.min_model_size);

        Ok(Self::with_loader(config, Arc::new(loader)))
    }

    /// Build a factory around an existing loader
    #[must_use]
    pub fn with_loader(config: RemovalConfig, loader: Arc<ModelLoader>) -> Self {
        Self {
            config,
            loader,
            engine_override: None,
        }
    }

    /// Run every variant on `engine` instead of the configured engine kinds
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn InferenceEngine>) -> Self {
        self.engine_override = Some(engine);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, kind: ModelKind) -> Result<Box<dyn SegmentationBackend>> {
        let model = self.config.model(kind).clone();
        model.preprocessing.validate()?;

        let engine = match &self.engine_override {
            Some(engine) => Arc::clone(engine),
            None => engine_for(model.engine)?,
        };
        log::debug!("Creating {} backend on {} engine", kind, engine.name());

        let core = BackendCore::new(
            kind,
            model,
            self.config.engine,
            Arc::clone(&self.loader),
            engine,
        );
        Ok(match kind {
            ModelKind::General => Box::new(GeneralSegmenter::new(core)),
            ModelKind::Portrait => Box::new(PortraitSegmenter::new(core)),
        })
    }
}

/// Lazily constructed backend instances, one per variant
pub struct BackendRegistry {
    factory: Arc<dyn BackendFactory>,
    backends: Mutex<HashMap<ModelKind, SharedBackend>>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            backends: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ModelKind, SharedBackend>>> {
        self.backends
            .lock()
            .map_err(|_| BgRemovalError::internal("Backend registry lock poisoned"))
    }

    /// The backend for `kind`, constructing it on first request
    ///
    /// # Errors
    /// Factory failures on first construction
    pub fn get(&self, kind: ModelKind) -> Result<SharedBackend> {
        let mut backends = self.lock()?;
        if let Some(backend) = backends.get(&kind) {
            return Ok(Arc::clone(backend));
        }

        let backend: SharedBackend = Arc::new(tokio::sync::Mutex::new(self.factory.create(kind)?));
        backends.insert(kind, Arc::clone(&backend));
        Ok(backend)
    }

    fn existing(&self, kind: ModelKind) -> Option<SharedBackend> {
        self.lock().ok().and_then(|b| b.get(&kind).cloned())
    }

    /// Whether the backend for `kind` has been constructed
    #[must_use]
    pub fn contains(&self, kind: ModelKind) -> bool {
        self.existing(kind).is_some()
    }

    /// Whether the backend for `kind` exists and is ready
    ///
    /// Waits for any in-flight request on that backend.
    pub async fn is_initialized(&self, kind: ModelKind) -> bool {
        match self.existing(kind) {
            Some(backend) => backend.lock().await.is_initialized(),
            None => false,
        }
    }

    /// Release the session of one variant; the instance itself is kept
    pub async fn cleanup(&self, kind: ModelKind) {
        if let Some(backend) = self.existing(kind) {
            backend.lock().await.cleanup();
        }
    }

    pub async fn cleanup_all(&self) {
        for kind in ModelKind::ALL {
            self.cleanup(kind).await;
        }
    }
}
