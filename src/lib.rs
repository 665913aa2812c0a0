#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Local Background Removal
//!
//! On-device background removal with two interchangeable segmentation
//! models: a portrait segmenter that runs at the image's own resolution and a
//! general-purpose segmenter that works on a fixed 320x320 input. Nothing
//! leaves the machine once a model is cached.
//!
//! ## Features
//!
//! - **Two Variants**: portrait (native resolution) and general (320x320 stretch)
//! - **Two Engines**: ONNX Runtime (GPU acceleration) and Tract (pure Rust)
//! - **Model Acquisition**: local files or HTTP(S) downloads, on-disk cache with
//!   integrity checks, one fallback source per model
//! - **Export**: lossless PNG and lossy WebP with alpha
//! - **Edge Softening**: alpha-only separable Gaussian blur
//! - **Progress**: a single 0-100 value across download and pipeline stages
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use local_bgremove::{ModelKind, RemovalConfig, RemovalOptions, RemovalOrchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = RemovalOrchestrator::from_config(RemovalConfig::default())?;
//! let options = RemovalOptions::new(ModelKind::Portrait).with_soften_radius(1.5);
//!
//! let result = orchestrator.process_file("portrait.jpg", &options).await?;
//! result.save_processed("portrait-no-bg.png")?;
//!
//! // Required before the next request
//! orchestrator.reset();
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime engine with GPU acceleration support
//! - `tract` (default): pure Rust engine
//! - `cli` (default): command-line interface and terminal progress
//! - `webp-support` (default): lossy WebP export
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! local-bgremove = { version = "0.1", default-features = false, features = ["onnx", "tract"] }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

// Public API exports
pub use backends::{engine_for, is_engine_available};
#[cfg(feature = "onnx")]
pub use backends::OnnxEngine;
#[cfg(feature = "tract")]
pub use backends::TractEngine;
pub use cache::{
    format_size, validate_model_bytes, CachedModelInfo, FsModelCache, MemoryModelCache,
    ModelCache,
};
pub use config::{
    BackgroundColor, EngineConfig, EngineKind, ExecutionProvider, ExportFormat, ModelConfig,
    ModelKind, PreprocessingConfig, RemovalConfig, RemovalConfigBuilder, RemovalOptions,
    TensorLayout, MAX_SOFTEN_RADIUS,
};
pub use download::{validate_model_url, DownloadProgress, DownloadProgressSender, ModelDownloader};
pub use error::{BgRemovalError, Result};
pub use inference::{InferenceEngine, InferenceSession};
pub use models::{ModelFetcher, ModelLoader, ModelSource};
pub use processor::{OrchestratorSnapshot, RemovalOrchestrator};
pub use segmentation::{
    BackendFactory, BackendRegistry, BackendState, DefaultBackendFactory, GeneralSegmenter,
    PortraitSegmenter, SegmentationBackend, SharedBackend,
};
pub use services::{
    ChannelProgressReporter, ConsoleProgressReporter, ImageIOService, NoOpProgressReporter,
    OutputFormatHandler, ProcessingStage, ProcessingStatus, ProgressEvent, ProgressReporter,
    ProgressUpdate,
};
pub use types::{InputTensor, MaskTensor, ProcessedImage, ProcessingTimings, RasterImage};
pub use utils::{composite_over, soften_edges, MaskPostprocessor, TensorPreprocessor};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background from encoded image bytes with a one-off orchestrator
///
/// Convenient for single images; long-running callers should keep one
/// [`RemovalOrchestrator`] so model sessions are reused.
///
/// ```rust,no_run
/// use local_bgremove::{remove_background_from_bytes, ModelKind, RemovalConfig, RemovalOptions};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let result = remove_background_from_bytes(
///     &upload,
///     &RemovalConfig::default(),
///     &RemovalOptions::new(ModelKind::General),
/// )
/// .await?;
/// println!("{}x{}", result.width, result.height);
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
    options: &RemovalOptions,
) -> Result<ProcessedImage> {
    let orchestrator = RemovalOrchestrator::from_config(config.clone())?;
    orchestrator.process(image_bytes, options).await
}

/// Remove the background from an async reader stream
///
/// The stream is read to the end before decoding.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    config: &RemovalConfig,
    options: &RemovalOptions,
) -> Result<ProcessedImage> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| BgRemovalError::file_io_error("read input stream", "<stream>", &e))?;

    remove_background_from_bytes(&buffer, config, options).await
}
