//! Shared fixtures for integration tests: a deterministic engine, scripted
//! model fetchers and synthetic images

#![allow(dead_code)]

use async_trait::async_trait;
use local_bgremove::{
    BackendRegistry, BgRemovalError, ChannelProgressReporter, DefaultBackendFactory,
    DownloadProgress, DownloadProgressSender, EngineConfig, ImageIOService, InferenceEngine,
    InferenceSession, MemoryModelCache, ModelFetcher, ModelLoader, ModelSource,
    ProgressEvent, RasterImage, RemovalConfig, RemovalOrchestrator, Result,
};
use ndarray::{Array4, ArrayD, Axis};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

pub const GENERAL_URL: &str = "https://models.test/general.onnx";
pub const PORTRAIT_URL: &str = "https://models.test/portrait.onnx";
pub const MODEL_BYTES: usize = 4096;
pub const MIN_MODEL_SIZE: usize = 1024;

/// Engine predicting foreground probability as mean RGB brightness
#[derive(Clone, Default)]
pub struct BrightnessEngine {
    pub fail_run: bool,
    pub loads: Arc<Mutex<usize>>,
}

impl BrightnessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_run() -> Self {
        Self {
            fail_run: true,
            ..Self::default()
        }
    }

    pub fn load_count(&self) -> usize {
        *self.loads.lock().unwrap()
    }
}

impl InferenceEngine for BrightnessEngine {
    fn name(&self) -> &'static str {
        "brightness"
    }

    fn load(&self, _model: &[u8], _config: &EngineConfig) -> Result<Box<dyn InferenceSession>> {
        *self.loads.lock().unwrap() += 1;
        Ok(Box::new(BrightnessSession {
            fail_run: self.fail_run,
        }))
    }
}

struct BrightnessSession {
    fail_run: bool,
}

impl InferenceSession for BrightnessSession {
    fn run(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        if self.fail_run {
            return Err(BgRemovalError::inference("session exploded"));
        }
        let shape = input.shape();
        let axis = if shape[1] == 3 && shape[3] != 3 { Axis(1) } else { Axis(3) };
        let mean = input
            .mean_axis(axis)
            .ok_or_else(|| BgRemovalError::inference("empty input"))?;
        Ok(mean.insert_axis(axis).into_dyn())
    }
}

/// Fetcher replaying a fixed list of `(loaded, total)` reports per fetch
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    pub reports: Vec<(u64, u64)>,
    pub failing: HashSet<String>,
    pub gate: Option<Arc<Notify>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reports(mut self, reports: Vec<(u64, u64)>) -> Self {
        self.reports = reports;
        self
    }

    pub fn failing_for(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Block every fetch until the returned handle is notified
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        source: &ModelSource,
        progress: Option<&DownloadProgressSender>,
    ) -> Result<Vec<u8>> {
        let key = source.cache_key();
        self.fetched.lock().unwrap().push(key.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.failing.contains(&key) {
            return Err(BgRemovalError::network_error("fetch", "connection refused"));
        }
        if let Some(tx) = progress {
            for (loaded, total) in &self.reports {
                let _ = tx.send(DownloadProgress {
                    source: source.display_name(),
                    loaded: *loaded,
                    total: *total,
                });
            }
        }
        Ok(vec![0x08; MODEL_BYTES])
    }
}

/// Both variants pointed at test URLs without fallbacks
pub fn test_config() -> RemovalConfig {
    let mut config = RemovalConfig::default();
    config.general = config
        .general
        .with_primary(ModelSource::Url(GENERAL_URL.to_string()))
        .with_fallback(None);
    config.portrait = config
        .portrait
        .with_primary(ModelSource::Url(PORTRAIT_URL.to_string()))
        .with_fallback(None);
    config.min_model_size = MIN_MODEL_SIZE;
    config
}

pub fn orchestrator(engine: BrightnessEngine, fetcher: ScriptedFetcher) -> RemovalOrchestrator {
    orchestrator_with_config(test_config(), engine, fetcher)
}

pub fn orchestrator_with_config(
    config: RemovalConfig,
    engine: BrightnessEngine,
    fetcher: ScriptedFetcher,
) -> RemovalOrchestrator {
    let loader = ModelLoader::new(
        Arc::new(fetcher),
        Some(Arc::new(MemoryModelCache::new())),
        config.min_model_size,
    );
    let factory =
        DefaultBackendFactory::with_loader(config, Arc::new(loader)).with_engine(Arc::new(engine));
    RemovalOrchestrator::new(Arc::new(BackendRegistry::new(Arc::new(factory))))
}

/// Attach a channel reporter, returning the event receiver
pub fn observed(
    orchestrator: RemovalOrchestrator,
) -> (RemovalOrchestrator, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (reporter, events) = ChannelProgressReporter::new();
    (orchestrator.with_reporter(Arc::new(reporter)), events)
}

/// Progress values of every update received so far
pub fn drain_progress(events: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<f32> {
    let mut progress = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ProgressEvent::Update(update) = event {
            progress.push(update.progress);
        }
    }
    progress
}

/// Left half white, right half black, fully opaque
pub fn split_image(width: u32, height: u32) -> RasterImage {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _y in 0..height {
        for x in 0..width {
            let v = if x < width / 2 { 255 } else { 0 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    RasterImage::from_rgba(width, height, data).unwrap()
}

pub fn split_png(width: u32, height: u32) -> Vec<u8> {
    ImageIOService::encode_png(&split_image(width, height)).unwrap()
}
