//! Portrait segmenter
//!
//! The model accepts arbitrary spatial dimensions, so the raster is packed
//! at its own resolution and the mask usually comes back full size.

use super::{BackendCore, BackendState, SegmentationBackend};
use crate::config::ModelKind;
use crate::download::DownloadProgressSender;
use crate::error::{BgRemovalError, Result};
use crate::types::{MaskTensor, RasterImage};
use crate::utils::{MaskPostprocessor, TensorPreprocessor};
use async_trait::async_trait;
use ndarray::ArrayD;

/// Native-resolution segmenter
pub struct PortraitSegmenter {
    core: BackendCore,
}

impl PortraitSegmenter {
    #[must_use]
    pub fn new(core: BackendCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl SegmentationBackend for PortraitSegmenter {
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
        let session = self.core.session_mut()?;

        let tensor = TensorPreprocessor::to_tensor_with(image, &preprocessing)?;
        let output = session.run(&tensor.data)?;
        let mask = extract_foreground(&output)?;

        // Only differs when the model downsamples internally
        let alpha = MaskPostprocessor::resample_mask(&mask, image.width(), image.height())?;
        let mut result = image.clone();
        result.set_alpha_channel(&alpha)?;
        Ok(result)
    }

    fn cleanup(&mut self) {
        self.core.cleanup();
    }
}

/// Pull the person-probability plane out of a segmentation output
///
/// Accepted layouts:
/// - `[H, W]`, `[1, H, W]`
/// - `[1, H, W, 1]` / `[1, 1, H, W]` (single probability channel)
/// - `[1, H, W, 2]` / `[1, 2, H, W]` (background/person; channel 1 is used)
///
/// # Errors
/// `Inference` for any other shape
pub fn extract_foreground(output: &ArrayD<f32>) -> Result<MaskTensor> {
    let shape = output.shape();
    let unsupported =
        || BgRemovalError::inference(format!("Unsupported segmentation output shape {:?}", shape));

    let (height, width, channels, interleaved) = match *shape {
        [h, w] | [1, h, w] => (h, w, 1, true),
        [1, h, w, c @ (1 | 2)] => (h, w, c, true),
        [1, c @ (1 | 2), h, w] => (h, w, c, false),
        _ => return Err(unsupported()),
    };

    let plane = height * width;
    let channel = channels - 1;
    let data: Vec<f32> = output.iter().copied().collect();

    let values: Vec<f32> = if interleaved {
        data.iter().skip(channel).step_by(channels).copied().take(plane).collect()
    } else {
        data.iter().skip(channel * plane).take(plane).copied().collect()
    };

    let width = u32::try_from(width).map_err(|_| unsupported())?;
    let height = u32::try_from(height).map_err(|_| unsupported())?;
    MaskTensor::new(width, height, values)
}
