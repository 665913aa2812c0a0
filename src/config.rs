//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::models::ModelSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable overriding the model cache root
pub const CACHE_DIR_ENV: &str = "LOCAL_BGREMOVE_CACHE_DIR";
/// Environment variable overriding the general segmenter's primary source
pub const GENERAL_MODEL_ENV: &str = "LOCAL_BGREMOVE_GENERAL_MODEL";
/// Environment variable overriding the portrait segmenter's primary source
pub const PORTRAIT_MODEL_ENV: &str = "LOCAL_BGREMOVE_PORTRAIT_MODEL";

/// Fixed square input side of the general-purpose segmenter
pub const GENERAL_INPUT_SIDE: u32 = 320;

/// Smallest model buffer accepted as plausible weights (64 KiB)
pub const DEFAULT_MIN_MODEL_SIZE: usize = 64 * 1024;

/// Largest accepted edge-softening radius, in pixels
pub const MAX_SOFTEN_RADIUS: f32 = 100.0;

const GENERAL_MODEL_PATH: &str = "models/u2net.onnx";
const GENERAL_MODEL_URL: &str =
    "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx";
const PORTRAIT_MODEL_PATH: &str = "models/selfie_segmentation_landscape.onnx";

/// The two interchangeable segmentation variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Portrait/landscape segmenter running at native resolution
    Portrait,
    /// General-purpose segmenter running at a fixed square resolution
    General,
}

impl ModelKind {
    /// All variants, in registry order
    pub const ALL: [ModelKind; 2] = [ModelKind::Portrait, ModelKind::General];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::General => "general",
        }
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::General
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" | "landscape" | "mediapipe" => Ok(Self::Portrait),
            "general" | "u2net" => Ok(Self::General),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown model kind '{}' (expected 'general' or 'portrait')",
                other
            ))),
        }
    }
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{}'",
                other
            ))),
        }
    }
}

/// Export format for the processed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Lossless PNG with alpha
    Png,
    /// Lossy WebP with alpha
    WebP,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl FromStr for ExportFormat {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unsupported export format '{}' (expected 'png' or 'webp')",
                other
            ))),
        }
    }
}

/// Inference engine used to execute a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// ONNX Runtime through `ort`
    Onnx,
    /// Pure Rust execution through `tract`
    Tract,
}

/// Memory order of the packed input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, channel-planar
    Nchw,
    /// `[1, H, W, 3]`, channel-interleaved
    Nhwc,
}

/// How an RGBA raster becomes model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square side the image is stretched to; `None` keeps native resolution
    pub input_side: Option<u32>,
    /// Per-channel mean subtracted after scaling to [0, 1]
    pub normalization_mean: [f32; 3],
    /// Per-channel divisor applied after mean subtraction
    pub normalization_std: [f32; 3],
    /// Tensor layout expected by the model
    pub layout: TensorLayout,
}

impl PreprocessingConfig {
    /// Plain [0, 1] scaling, channel-planar, stretched to `side`
    #[must_use]
    pub fn fixed_square(side: u32) -> Self {
        Self {
            input_side: Some(side),
            normalization_mean: [0.0; 3],
            normalization_std: [1.0; 3],
            layout: TensorLayout::Nchw,
        }
    }

    /// Plain [0, 1] scaling at the image's own resolution, channel-interleaved
    #[must_use]
    pub fn native_resolution() -> Self {
        Self {
            input_side: None,
            normalization_mean: [0.0; 3],
            normalization_std: [1.0; 3],
            layout: TensorLayout::Nhwc,
        }
    }

    /// Validate normalization and side parameters
    ///
    /// # Errors
    /// - Zero input side
    /// - Zero or non-finite std, non-finite mean
    pub fn validate(&self) -> Result<()> {
        if self.input_side == Some(0) {
            return Err(BgRemovalError::config_value_error(
                "input side",
                0,
                "1 or more",
            ));
        }
        for (mean, std) in self.normalization_mean.iter().zip(&self.normalization_std) {
            if !mean.is_finite() {
                return Err(BgRemovalError::invalid_config(format!(
                    "Normalization mean must be finite, got {}",
                    mean
                )));
            }
            if !std.is_finite() || *std == 0.0 {
                return Err(BgRemovalError::invalid_config(format!(
                    "Normalization std must be finite and non-zero, got {}",
                    std
                )));
            }
        }
        Ok(())
    }
}

/// Everything needed to acquire and run one segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where the weights come from first
    pub primary: ModelSource,
    /// Tried once when the primary source fails
    pub fallback: Option<ModelSource>,
    /// Engine executing the model
    pub engine: EngineKind,
    /// Input packing
    pub preprocessing: PreprocessingConfig,
}

impl ModelConfig {
    /// U2-Net style general segmenter: local weights first, release download as fallback
    #[must_use]
    pub fn general() -> Self {
        Self {
            primary: ModelSource::File(PathBuf::from(GENERAL_MODEL_PATH)),
            fallback: Some(ModelSource::Url(GENERAL_MODEL_URL.to_string())),
            engine: EngineKind::Onnx,
            preprocessing: PreprocessingConfig::fixed_square(GENERAL_INPUT_SIDE),
        }
    }

    /// Selfie/landscape style portrait segmenter, run at native resolution
    #[must_use]
    pub fn portrait() -> Self {
        Self {
            primary: ModelSource::File(PathBuf::from(PORTRAIT_MODEL_PATH)),
            fallback: None,
            engine: EngineKind::Tract,
            preprocessing: PreprocessingConfig::native_resolution(),
        }
    }

    #[must_use]
    pub fn with_primary(mut self, source: ModelSource) -> Self {
        self.primary = source;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, source: Option<ModelSource>) -> Self {
        self.fallback = source;
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }
}

/// Inference engine settings shared by both variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

/// Configuration for the removal pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// General-purpose segmenter
    pub general: ModelConfig,
    /// Portrait segmenter
    pub portrait: ModelConfig,
    /// Engine settings
    pub engine: EngineConfig,
    /// Model cache root (`None` = platform cache dir)
    pub cache_dir: Option<PathBuf>,
    /// Bypass the model cache entirely
    pub disable_cache: bool,
    /// Smallest byte count accepted as model weights
    pub min_model_size: usize,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            general: ModelConfig::general(),
            portrait: ModelConfig::portrait(),
            engine: EngineConfig::default(),
            cache_dir: None,
            disable_cache: false,
            min_model_size: DEFAULT_MIN_MODEL_SIZE,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use local_bgremove::{ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .num_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.engine.inter_threads, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Model configuration for a variant
    #[must_use]
    pub fn model(&self, kind: ModelKind) -> &ModelConfig {
        match kind {
            ModelKind::Portrait => &self.portrait,
            ModelKind::General => &self.general,
        }
    }

    fn model_mut(&mut self, kind: ModelKind) -> &mut ModelConfig {
        match kind {
            ModelKind::Portrait => &mut self.portrait,
            ModelKind::General => &mut self.general,
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    ///
    /// # Errors
    /// Malformed JSON or a configuration that fails validation
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            BgRemovalError::invalid_config(format!("Invalid configuration JSON: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    /// File read errors, malformed JSON or failed validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read configuration", path, &e))?;
        Self::from_json_str(&json)
    }

    /// Apply `LOCAL_BGREMOVE_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.cache_dir = Some(PathBuf::from(dir));
            }
        }
        for (kind, var) in [
            (ModelKind::General, GENERAL_MODEL_ENV),
            (ModelKind::Portrait, PORTRAIT_MODEL_ENV),
        ] {
            if let Ok(source) = std::env::var(var) {
                if !source.trim().is_empty() {
                    log::debug!("Using {} model source from {}", kind, var);
                    self.model_mut(kind).primary = ModelSource::parse(source.trim());
                }
            }
        }
        self
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Invalid preprocessing parameters for either variant
    /// - Zero minimum model size
    pub fn validate(&self) -> Result<()> {
        self.general.preprocessing.validate()?;
        self.portrait.preprocessing.validate()?;
        if self.general.preprocessing.input_side.is_none() {
            return Err(BgRemovalError::invalid_config(
                "General segmenter requires a fixed input side",
            ));
        }
        if self.min_model_size == 0 {
            return Err(BgRemovalError::config_value_error(
                "minimum model size",
                0,
                "1 or more bytes",
            ));
        }
        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.engine.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.engine.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.engine.inter_threads = threads;
        self
    }

    /// Set intra threads to `threads` and inter threads to half of it (0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.engine.intra_threads = threads;
        self.config.engine.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Replace a variant's model configuration
    #[must_use]
    pub fn model_config(mut self, kind: ModelKind, model: ModelConfig) -> Self {
        *self.config.model_mut(kind) = model;
        self
    }

    /// Replace a variant's primary model source
    #[must_use]
    pub fn model_source(mut self, kind: ModelKind, source: ModelSource) -> Self {
        self.config.model_mut(kind).primary = source;
        self
    }

    /// Set the model cache root
    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Enable or disable the model cache
    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    /// Set the minimum plausible model size in bytes
    #[must_use]
    pub fn min_model_size(mut self, bytes: usize) -> Self {
        self.config.min_model_size = bytes;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any parameter rejected by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Solid colour composited behind the cut-out subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for BackgroundColor {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            _ => {},
        }
        let hex = s.strip_prefix('#').unwrap_or(s);
        let parse = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|part| u8::from_str_radix(part, 16).ok())
        };
        match (hex.len(), parse(0..2), parse(2..4), parse(4..6)) {
            (6, Some(r), Some(g), Some(b)) => Ok(Self::new(r, g, b)),
            _ => Err(BgRemovalError::invalid_config(format!(
                "Invalid background colour '{}' (expected #rrggbb, white or black)",
                s
            ))),
        }
    }
}

/// Per-request options chosen by the caller before each removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalOptions {
    /// Segmentation variant
    pub model: ModelKind,
    /// Export format of the processed image
    pub format: ExportFormat,
    /// Lossy quality in [0, 1] (`None` = 1.0)
    pub quality: Option<f32>,
    /// Edge softening blur radius in pixels (`None` = no softening)
    pub soften_radius: Option<f32>,
    /// Solid colour composited behind the subject
    pub background: Option<BackgroundColor>,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            format: ExportFormat::default(),
            quality: None,
            soften_radius: None,
            background: None,
        }
    }
}

impl RemovalOptions {
    #[must_use]
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality);
        self
    }

    #[must_use]
    pub fn with_soften_radius(mut self, radius: f32) -> Self {
        self.soften_radius = Some(radius);
        self
    }

    #[must_use]
    pub fn with_background(mut self, color: BackgroundColor) -> Self {
        self.background = Some(color);
        self
    }

    /// Effective softening radius, if softening applies at all
    #[must_use]
    pub fn effective_soften_radius(&self) -> Option<f32> {
        self.soften_radius.filter(|r| *r > 0.0)
    }

    /// Validate quality and softening parameters
    ///
    /// # Errors
    /// - Quality outside [0, 1]
    /// - Softening radius outside [0, `MAX_SOFTEN_RADIUS`]
    pub fn validate(&self) -> Result<()> {
        if let Some(q) = self.quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(BgRemovalError::config_value_error("quality", q, "0.0-1.0"));
            }
        }
        if let Some(r) = self.soften_radius {
            if !r.is_finite() || !(0.0..=MAX_SOFTEN_RADIUS).contains(&r) {
                return Err(BgRemovalError::config_value_error(
                    "soften radius",
                    r,
                    "0-100 pixels",
                ));
            }
        }
        Ok(())
    }
}
