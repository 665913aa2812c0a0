//! Segmentation backends
//!
//! A [`SegmentationBackend`] owns one model session for one [`ModelKind`]
//! and turns an RGBA raster into the same raster with its alpha channel
//! replaced by foreground probability. The orchestrator only talks to the
//! trait; the two variants differ in how they feed the model.

mod general;
mod portrait;
mod registry;

#[cfg(test)]
pub mod test_utils;

pub use general::GeneralSegmenter;
pub use portrait::{extract_foreground, PortraitSegmenter};
pub use registry::{BackendFactory, BackendRegistry, DefaultBackendFactory, SharedBackend};

use crate::config::{EngineConfig, ModelConfig, ModelKind};
use crate::download::DownloadProgressSender;
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceEngine, InferenceSession};
use crate::models::ModelLoader;
use crate::types::RasterImage;
use async_trait::async_trait;
use std::sync::Arc;

/// Lifecycle of a backend's model session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    /// No session; inference fails
    Uninitialized,
    /// Model acquisition or session construction in progress
    Initializing,
    /// Session loaded and ready for inference
    Ready,
}

/// Contract shared by every segmentation model variant
#[async_trait]
pub trait SegmentationBackend: Send {
    /// Variant implemented by this backend
    fn kind(&self) -> ModelKind;

    /// Current lifecycle state
    fn state(&self) -> BackendState;

    /// Acquire the model and build a session
    ///
    /// Calling this on a ready backend is a no-op. Download progress is
    /// published on `progress` while the weights are fetched.
    ///
    /// # Errors
    /// Initialization-class errors; the backend stays uninitialized
    async fn initialize(&mut self, progress: Option<DownloadProgressSender>) -> Result<()>;

    /// Replace the alpha channel of `image` with the predicted foreground mask
    ///
    /// The returned raster has the input's dimensions and bit-identical RGB.
    ///
    /// # Errors
    /// - `NotInitialized` before a successful [`SegmentationBackend::initialize`]
    /// - `Inference` on runtime or output shape failures
    fn remove_background(&mut self, image: &RasterImage) -> Result<RasterImage>;

    fn is_initialized(&self) -> bool {
        self.state() == BackendState::Ready
    }

    /// Release the session and return to the uninitialized state
    fn cleanup(&mut self);
}

/// Model lifecycle shared by both variants
pub struct BackendCore {
    kind: ModelKind,
    model: ModelConfig,
    engine_config: EngineConfig,
    loader: Arc<ModelLoader>,
    engine: Arc<dyn InferenceEngine>,
    session: Option<Box<dyn InferenceSession>>,
    state: BackendState,
}

impl BackendCore {
    #[must_use]
    pub fn new(
        kind: ModelKind,
        model: ModelConfig,
        engine_config: EngineConfig,
        loader: Arc<ModelLoader>,
        engine: Arc<dyn InferenceEngine>,
    ) -> Self {
        Self {
            kind,
            model,
            engine_config,
            loader,
            engine,
            session: None,
            state: BackendState::Uninitialized,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> BackendState {
        self.state
    }

    #[must_use]
    pub fn model_config(&self) -> &ModelConfig {
        &self.model
    }

    /// Load the session unless already ready
    ///
    /// # Errors
    /// Model acquisition or session construction failures
    pub async fn initialize(&mut self, progress: Option<DownloadProgressSender>) -> Result<()> {
        if self.state == BackendState::Ready {
            log::debug!("{} backend already initialized", self.kind);
            return Ok(());
        }

        self.state = BackendState::Initializing;
        let load_start = instant::Instant::now();
        let loaded = Self::load_session(
            Arc::clone(&self.loader),
            self.model.clone(),
            Arc::clone(&self.engine),
            self.engine_config,
            progress,
        )
        .await;
        match loaded {
            Ok(session) => {
                self.session = Some(session);
                self.state = BackendState::Ready;
                log::info!(
                    "{} backend ready ({} engine) in {:.0}ms",
                    self.kind,
                    self.engine.name(),
                    load_start.elapsed().as_secs_f64() * 1000.0
                );
                Ok(())
            },
            Err(e) => {
                self.session = None;
                self.state = BackendState::Uninitialized;
                log::error!("{} backend failed to initialize: {}", self.kind, e);
                Err(e)
            },
        }
    }

    async fn load_session(
        loader: Arc<ModelLoader>,
        model: ModelConfig,
        engine: Arc<dyn InferenceEngine>,
        config: EngineConfig,
        progress: Option<DownloadProgressSender>,
    ) -> Result<Box<dyn InferenceSession>> {
        let bytes = loader.load(&model, progress.as_ref()).await?;
        // Nothing more to report once the bytes are in hand
        drop(progress);

        tokio::task::spawn_blocking(move || engine.load(&bytes, &config))
            .await
            .map_err(|e| BgRemovalError::internal(format!("Model load task failed: {e}")))?
    }

    /// The live session, or `NotInitialized`
    ///
    /// # Errors
    /// `NotInitialized` unless the backend is ready
    pub fn session_mut(&mut self) -> Result<&mut (dyn InferenceSession + 'static)> {
        if self.state != BackendState::Ready {
            return Err(BgRemovalError::not_initialized(self.kind.as_str()));
        }
        self.session
            .as_deref_mut()
            .ok_or_else(|| BgRemovalError::not_initialized(self.kind.as_str()))
    }

    pub fn cleanup(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Released {} session", self.kind);
        }
        self.state = BackendState::Uninitialized;
    }
}
