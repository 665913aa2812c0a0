//! General-purpose segmenter
//!
//! The model only accepts a fixed square input, so every image goes through
//! stretch-to-square preprocessing and the mask is resampled back up.

use super::{BackendCore, BackendState, SegmentationBackend};
use crate::config::ModelKind;
use crate::download::DownloadProgressSender;
use crate::error::{BgRemovalError, Result};
use crate::types::{MaskTensor, RasterImage};
use crate::utils::{MaskPostprocessor, TensorPreprocessor};
use async_trait::async_trait;

/// Fixed-resolution segmenter (320x320 by default)
pub struct GeneralSegmenter {
    core: BackendCore,
}

impl GeneralSegmenter {
    #[must_use]
    pub fn new(core: BackendCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl SegmentationBackend for GeneralSegmenter {
    fn kind(&self) -> ModelKind {
        self.core.kind()
    }

    fn state(&self) -> BackendState {
        self.core.state()
    }

    async fn initialize(&mut self, progress: Option<DownloadProgressSender>) -> Result<()> {
        self.core.initialize(progress).await
    }

    fn remove_background(&mut self, image: &RasterImage) -> Result<RasterImage> {
        let preprocessing = self.core.model_config().preprocessing.clone();
        let side = preprocessing.input_side.ok_or_else(|| {
            BgRemovalError::invalid_config("General segmenter requires a fixed input side")
        })?;
        let session = self.core.session_mut()?;

        let tensor = TensorPreprocessor::to_tensor_with(image, &preprocessing)?;
        let output = session.run(&tensor.data)?;
        let values: Vec<f32> = output.iter().copied().collect();

        let mask = MaskTensor::from_model_output(&values, side)?;
        MaskPostprocessor::apply_mask(&mask, side, image.width(), image.height(), image)
    }

    fn cleanup(&mut self) {
        self.core.cleanup();
    }
}
