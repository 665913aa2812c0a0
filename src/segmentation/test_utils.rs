//! Mock engine and model plumbing for testing backends without real weights

use crate::{
    cache::MemoryModelCache,
    config::{EngineConfig, ModelConfig, ModelKind, RemovalConfig},
    download::DownloadProgressSender,
    error::{BgRemovalError, Result},
    inference::{InferenceEngine, InferenceSession},
    models::{ModelFetcher, ModelLoader, ModelSource},
};
use async_trait::async_trait;
use ndarray::{Array4, ArrayD, Axis};
use std::sync::{Arc, Mutex};

/// Size of the fake weights served by [`StaticFetcher`]
pub const MOCK_MODEL_SIZE: usize = 4096;

/// Engine whose sessions predict "brightness = foreground probability"
///
/// Output layout mirrors the input: `[1, 3, H, W]` gives `[1, 1, H, W]`,
/// `[1, H, W, 3]` gives `[1, H, W, 1]`.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    fail_load: bool,
    fail_run: bool,
    loads: Arc<Mutex<usize>>,
    runs: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_run() -> Self {
        Self {
            fail_run: true,
            ..Self::default()
        }
    }

    pub fn load_count(&self) -> usize {
        *self.loads.lock().unwrap()
    }

    /// Input shapes seen by every session of this engine
    pub fn run_shapes(&self) -> Vec<Vec<usize>> {
        self.runs.lock().unwrap().clone()
    }
}

impl InferenceEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn load(&self, _model: &[u8], _config: &EngineConfig) -> Result<Box<dyn InferenceSession>> {
        *self.loads.lock().unwrap() += 1;
        if self.fail_load {
            return Err(BgRemovalError::init("Mock engine refused to load"));
        }
        Ok(Box::new(MockSession {
            fail_run: self.fail_run,
            runs: Arc::clone(&self.runs),
        }))
    }
}

struct MockSession {
    fail_run: bool,
    runs: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl InferenceSession for MockSession {
    fn run(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        self.runs.lock().unwrap().push(input.shape().to_vec());
        if self.fail_run {
            return Err(BgRemovalError::inference("Mock inference failure"));
        }

        let channels_first = input.shape().get(1) == Some(&3) && input.shape().get(3) != Some(&3);
        let axis = if channels_first { Axis(1) } else { Axis(3) };
        let mean = input
            .mean_axis(axis)
            .ok_or_else(|| BgRemovalError::inference("Empty input"))?
            .insert_axis(axis);
        Ok(mean.into_dyn())
    }
}

/// Fetcher that serves fixed bytes for any source
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    bytes: Vec<u8>,
}

impl StaticFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: vec![0x08; MOCK_MODEL_SIZE],
        }
    }
}

#[async_trait]
impl ModelFetcher for StaticFetcher {
    async fn fetch(
        &self,
        source: &ModelSource,
        progress: Option<&DownloadProgressSender>,
    ) -> Result<Vec<u8>> {
        if let Some(tx) = progress {
            let _ = tx.send(crate::download::DownloadProgress {
                source: source.display_name(),
                loaded: self.bytes.len() as u64,
                total: self.bytes.len() as u64,
            });
        }
        Ok(self.bytes.clone())
    }
}

/// Loader backed by [`StaticFetcher`] and an in-memory cache
#[must_use]
pub fn mock_loader() -> Arc<ModelLoader> {
    Arc::new(ModelLoader::new(
        Arc::new(StaticFetcher::new()),
        Some(Arc::new(MemoryModelCache::new())),
        1024,
    ))
}

/// Default model configuration for a kind
#[must_use]
pub fn model_config(kind: ModelKind) -> ModelConfig {
    RemovalConfig::default().model(kind).clone()
}
