//! Removal orchestration
//!
//! [`RemovalOrchestrator`] drives one request at a time through
//! `idle → loading → processing → completed | error`, mapping model download
//! progress and pipeline stages onto a single 0-100 progress value.
//!
//! Every state change is tagged with the generation of the request that made
//! it. [`RemovalOrchestrator::reset`] bumps the generation, so a request that
//! is still running afterwards can no longer touch the visible state and its
//! caller receives [`BgRemovalError::Superseded`].

use crate::{
    config::{ModelKind, RemovalConfig, RemovalOptions},
    download::DownloadProgress,
    error::{BgRemovalError, Result},
    segmentation::{BackendRegistry, DefaultBackendFactory, SegmentationBackend},
    services::{
        download_progress, ImageIOService, NoOpProgressReporter, ProcessingStage,
        ProcessingStatus, ProgressReporter, ProgressUpdate,
    },
    types::{ProcessedImage, ProcessingTimings},
    utils::{composite_over, soften_edges},
};
use instant::Instant;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug as trace_debug, info as trace_info, instrument, warn as trace_warn};

/// Caller-visible state of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSnapshot {
    pub status: ProcessingStatus,
    /// 0-100, never decreasing within one request
    pub progress: f32,
    /// Message of the last failure, cleared by reset
    pub error: Option<String>,
    /// Variant of the current or last request
    pub model: Option<ModelKind>,
    pub generation: u64,
}

struct State {
    status: ProcessingStatus,
    progress: f32,
    error: Option<String>,
    result: Option<ProcessedImage>,
    model: Option<ModelKind>,
    stage: ProcessingStage,
    generation: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            status: ProcessingStatus::Idle,
            progress: 0.0,
            error: None,
            result: None,
            model: None,
            stage: ProcessingStage::ModelLoading,
            generation: 0,
        }
    }
}

/// Sequences backend initialization, segmentation and export
pub struct RemovalOrchestrator {
    registry: Arc<BackendRegistry>,
    reporter: Arc<dyn ProgressReporter>,
    state: Mutex<State>,
}

impl RemovalOrchestrator {
    /// Create an orchestrator over an existing registry
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            reporter: Arc::new(NoOpProgressReporter),
            state: Mutex::new(State::default()),
        }
    }

    /// Create an orchestrator with the default factory for a configuration
    ///
    /// # Errors
    /// Invalid configuration, cache or HTTP client setup failures
    pub fn from_config(config: RemovalConfig) -> Result<Self> {
        let factory = DefaultBackendFactory::new(config)?;
        Ok(Self::new(Arc::new(BackendRegistry::new(Arc::new(factory)))))
    }

    /// Send progress to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        self.lock().status
    }

    #[must_use]
    pub fn progress(&self) -> f32 {
        self.lock().progress
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Result of the last completed request, until reset
    #[must_use]
    pub fn result(&self) -> Option<ProcessedImage> {
        self.lock().result.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> OrchestratorSnapshot {
        let state = self.lock();
        OrchestratorSnapshot {
            status: state.status,
            progress: state.progress,
            error: state.error.clone(),
            model: state.model,
            generation: state.generation,
        }
    }

    /// Return to idle, discarding the previous result and error
    ///
    /// A request still in flight is detached: its outcome is dropped.
    pub fn reset(&self) {
        let mut state = self.lock();
        let previous = state.status;
        let generation = state.generation + 1;
        *state = State {
            generation,
            ..State::default()
        };
        trace_debug!(%previous, generation, "Orchestrator reset");
    }

    /// Read an image file and process it
    ///
    /// # Errors
    /// File read failures, then anything [`RemovalOrchestrator::process`] returns
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        path: P,
        options: &RemovalOptions,
    ) -> Result<ProcessedImage> {
        let bytes = ImageIOService::read_bytes(path).await?;
        self.process(&bytes, options).await
    }

    /// Remove the background from an encoded image
    ///
    /// Only accepted while idle. On success the orchestrator is `completed`
    /// and keeps a copy of the result; on failure it is `error` with progress
    /// frozen at its last value. Either way [`RemovalOrchestrator::reset`] is
    /// required before the next request.
    ///
    /// # Errors
    /// - `InvalidConfig` for invalid options (state untouched)
    /// - `Busy` when not idle (state untouched)
    /// - `Superseded` when a reset happened while this request ran
    /// - Initialization, decode, inference or encode errors
    #[instrument(skip(self, input, options), fields(model = %options.model, bytes = input.len()))]
    pub async fn process(&self, input: &[u8], options: &RemovalOptions) -> Result<ProcessedImage> {
        options.validate()?;
        let generation = self.begin(options.model)?;
        let start = Instant::now();

        match self.run(generation, input, options, start).await {
            Ok(result) => {
                self.complete(generation, &result, start)?;
                Ok(result)
            },
            Err(e) => Err(self.fail(generation, e)),
        }
    }

    fn begin(&self, model: ModelKind) -> Result<u64> {
        let mut state = self.lock();
        if state.status != ProcessingStatus::Idle {
            return Err(BgRemovalError::busy(format!(
                "orchestrator is {}; reset it before submitting a new request",
                state.status
            )));
        }
        state.status = ProcessingStatus::Loading;
        state.progress = 0.0;
        state.stage = ProcessingStage::ModelLoading;
        state.model = Some(model);
        trace_info!(generation = state.generation, %model, "Request accepted");
        Ok(state.generation)
    }

    async fn run(
        &self,
        generation: u64,
        input: &[u8],
        options: &RemovalOptions,
        start: Instant,
    ) -> Result<ProcessedImage> {
        let mut timings = ProcessingTimings::default();
        let backend = self.registry.get(options.model)?;
        // Held until segmentation finishes; serializes requests per variant
        let mut backend = backend.lock_owned().await;

        if !backend.is_initialized() {
            let load_start = Instant::now();
            self.initialize_backend(generation, &mut **backend, start).await?;
            timings.model_load_ms = load_start.elapsed().as_millis() as u64;
        }
        self.advance(generation, ProcessingStage::ModelReady, start)?;
        self.advance(generation, ProcessingStage::Processing, start)?;

        let decode_start = Instant::now();
        let bytes = input.to_vec();
        let original = blocking(move || ImageIOService::decode(&bytes)).await?;
        timings.image_decode_ms = decode_start.elapsed().as_millis() as u64;
        trace_debug!(width = original.width(), height = original.height(), "Input decoded");
        self.advance(generation, ProcessingStage::ImageDecoded, start)?;

        let segment_start = Instant::now();
        let (original, segmented) = blocking(move || {
            let result = backend.remove_background(&original);
            Ok((original, result))
        })
        .await?;
        let mut processed = segmented?;
        timings.segmentation_ms = segment_start.elapsed().as_millis() as u64;
        self.advance(generation, ProcessingStage::BackgroundRemoved, start)?;

        let post_start = Instant::now();
        if let Some(radius) = options.effective_soften_radius() {
            processed = blocking(move || Ok(soften_edges(&processed, radius))).await?;
            self.advance(generation, ProcessingStage::EdgesSoftened, start)?;
        }
        if let Some(color) = options.background {
            processed = composite_over(&processed, color);
        }
        timings.postprocessing_ms = post_start.elapsed().as_millis() as u64;

        let encode_start = Instant::now();
        let (format, quality) = (options.format, options.quality);
        let (original, processed, original_encoded, processed_encoded) = blocking(move || {
            let original_encoded = ImageIOService::encode(&original, format, quality)?;
            let processed_encoded = ImageIOService::encode(&processed, format, quality)?;
            Ok((original, processed, original_encoded, processed_encoded))
        })
        .await?;
        timings.encode_ms = encode_start.elapsed().as_millis() as u64;
        timings.total_ms = start.elapsed().as_millis() as u64;

        let (width, height) = processed.dimensions();
        Ok(ProcessedImage {
            original,
            processed,
            original_encoded,
            processed_encoded,
            format,
            width,
            height,
            timings,
        })
    }

    /// Initialize `backend`, forwarding download progress into 0-30
    async fn initialize_backend(
        &self,
        generation: u64,
        backend: &mut dyn SegmentationBackend,
        start: Instant,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<DownloadProgress>();
        let mut init = backend.initialize(Some(tx));
        let mut channel_open = true;

        // Init is never abandoned midway: a half-built backend would be
        // left in the initializing state.
        let result = loop {
            tokio::select! {
                biased;
                message = rx.recv(), if channel_open => match message {
                    Some(report) => self.on_download(generation, &report, start),
                    None => channel_open = false,
                },
                result = &mut init => break result,
            }
        };
        drop(init);
        while let Ok(report) = rx.try_recv() {
            self.on_download(generation, &report, start);
        }
        result
    }

    fn on_download(&self, generation: u64, report: &DownloadProgress, start: Instant) {
        let update = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            let next = download_progress(state.progress, report.loaded, report.total);
            if next <= state.progress {
                return;
            }
            state.progress = next;
            ProgressUpdate::with_progress(ProcessingStage::ModelLoading, next, start)
                .with_description(format!("Loading {}", report.source))
        };
        self.reporter.report_progress(update);
    }

    fn advance(&self, generation: u64, stage: ProcessingStage, start: Instant) -> Result<()> {
        let update = {
            let mut state = self.lock();
            if state.generation != generation {
                return Err(BgRemovalError::Superseded);
            }
            let progress = f32::from(stage.progress_percentage()).max(state.progress);
            state.status = stage.status();
            state.stage = stage;
            state.progress = progress;
            ProgressUpdate::with_progress(stage, progress, start)
        };
        trace_debug!(stage = ?stage, progress = update.progress, "Stage reached");
        self.reporter.report_progress(update);
        Ok(())
    }

    fn complete(&self, generation: u64, result: &ProcessedImage, start: Instant) -> Result<()> {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return Err(BgRemovalError::Superseded);
            }
            state.status = ProcessingStatus::Completed;
            state.stage = ProcessingStage::Completed;
            state.progress = 100.0;
            state.result = Some(result.clone());
        }
        trace_info!(
            width = result.width,
            height = result.height,
            total_ms = result.timings.total_ms,
            "Background removal completed"
        );
        self.reporter
            .report_progress(ProgressUpdate::new(ProcessingStage::Completed, start));
        self.reporter.report_completion(result.timings.clone());
        Ok(())
    }

    /// Record a failure unless the request was superseded; returns the error to surface
    fn fail(&self, generation: u64, error: BgRemovalError) -> BgRemovalError {
        let stage = {
            let mut state = self.lock();
            if state.generation != generation {
                trace_debug!(%error, "Discarding outcome of superseded request");
                return BgRemovalError::Superseded;
            }
            state.status = ProcessingStatus::Error;
            state.error = Some(error.to_string());
            state.result = None;
            state.stage
        };
        trace_warn!(%error, stage = ?stage, "Background removal failed");
        self.reporter.report_error(stage, &error.to_string());
        error
    }
}

/// Run CPU-bound work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BgRemovalError::internal(format!("Worker task failed: {e}")))?
}
