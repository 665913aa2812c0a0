//! Progress reporting service
//!
//! Separates progress reporting from the pipeline so that different
//! frontends (log lines, terminal bars, UI channels) can consume it.

use crate::types::ProcessingTimings;
use instant::Instant;
use tokio::sync::mpsc;

/// Upper bound of the model-download progress sub-range
pub const MODEL_LOADING_MAX: f32 = 30.0;
/// Ceiling for progress nudges while the download size is unknown
pub const UNKNOWN_TOTAL_CAP: f32 = 25.0;

/// Lifecycle status of a removal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Idle,
    Loading,
    Processing,
    Completed,
    Error,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Progress stages during background removal processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Acquiring weights and building the session (0-30)
    ModelLoading,
    /// Backend is ready
    ModelReady,
    /// Request accepted for processing
    Processing,
    /// Input decoded into a raster
    ImageDecoded,
    /// Segmentation mask applied
    BackgroundRemoved,
    /// Alpha edges softened
    EdgesSoftened,
    /// Outputs encoded
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ModelLoading => "Loading segmentation model",
            ProcessingStage::ModelReady => "Model ready",
            ProcessingStage::Processing => "Processing image",
            ProcessingStage::ImageDecoded => "Image decoded",
            ProcessingStage::BackgroundRemoved => "Background removed",
            ProcessingStage::EdgesSoftened => "Edges softened",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Progress percentage reached when the stage completes
    ///
    /// `ModelLoading` reports the top of its variable sub-range.
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ModelLoading => 30,
            ProcessingStage::ModelReady => 35,
            ProcessingStage::Processing => 40,
            ProcessingStage::ImageDecoded => 60,
            ProcessingStage::BackgroundRemoved => 80,
            ProcessingStage::EdgesSoftened => 90,
            ProcessingStage::Completed => 100,
        }
    }

    /// Status the orchestrator is in while this stage is reported
    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        match self {
            ProcessingStage::ModelLoading | ProcessingStage::ModelReady => ProcessingStatus::Loading,
            ProcessingStage::Completed => ProcessingStatus::Completed,
            _ => ProcessingStatus::Processing,
        }
    }
}

/// Map a `(loaded, total)` download report into the model-loading sub-range
///
/// A known total maps linearly onto (0, 30]. An unknown total (0) nudges
/// `current` up by one, never beyond 25. The result never goes below `current`.
#[must_use]
pub fn download_progress(current: f32, loaded: u64, total: u64) -> f32 {
    let next = if total > 0 {
        let fraction = (loaded as f64 / total as f64).clamp(0.0, 1.0) as f32;
        fraction * MODEL_LOADING_MAX
    } else {
        (current + 1.0).min(UNKNOWN_TOTAL_CAP)
    };
    next.max(current)
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Orchestrator status at the time of the update
    pub status: ProcessingStatus,
    /// Progress percentage (0-100)
    pub progress: f32,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create an update at the stage's canonical percentage
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_progress(stage, f32::from(stage.progress_percentage()), start_time)
    }

    /// Create an update at an explicit percentage (download sub-range)
    #[must_use]
    pub fn with_progress(stage: ProcessingStage, progress: f32, start_time: Instant) -> Self {
        Self {
            status: stage.status(),
            progress,
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Replace the description
    #[must_use]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }
}

/// Trait for reporting progress during background removal operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report an error during processing
    ///
    /// # Arguments
    /// * `stage` - Last stage reached before the failure
    /// * `error` - Error description
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show timing details
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{:.0}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{:.0}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("✅ Background removal completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Model load: {}ms", timings.model_load_ms);
            log::info!("    • Image decode: {}ms", timings.image_decode_ms);
            log::info!("    • Segmentation: {}ms", timings.segmentation_ms);
            log::info!("    • Postprocessing: {}ms", timings.postprocessing_ms);
            log::info!("    • Encoding: {}ms", timings.encode_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Event forwarded by [`ChannelProgressReporter`]
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Update(ProgressUpdate),
    Completed(ProcessingTimings),
    Failed {
        stage: ProcessingStage,
        message: String,
    },
}

/// Forwards every report over an unbounded channel
///
/// Lets a UI task observe progress without sharing state with the pipeline.
/// Reports sent after the receiver is dropped are discarded.
pub struct ChannelProgressReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressReporter {
    /// Create a reporter and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Progress receiver dropped");
        }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.send(ProgressEvent::Update(update));
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        self.send(ProgressEvent::Completed(timings));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.send(ProgressEvent::Failed {
            stage,
            message: error.to_string(),
        });
    }
}
