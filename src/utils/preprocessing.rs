//! Tensor preprocessing
//!
//! Turns an RGBA raster into the packed, normalized numeric input a
//! segmentation model expects. Resampling uses a triangle (bilinear) filter;
//! the mask postprocessor uses the same filter on the way back.

use crate::{
    config::{PreprocessingConfig, TensorLayout},
    error::{BgRemovalError, Result},
    types::{InputTensor, RasterImage},
};
use image::{imageops, RgbImage, RgbaImage};
use ndarray::Array4;

/// Continuous filter shared by down- and up-sampling
pub const RESAMPLE_FILTER: imageops::FilterType = imageops::FilterType::Triangle;

/// Packs rasters into model input tensors
pub struct TensorPreprocessor;

impl TensorPreprocessor {
    /// Stretch `image` to `side x side` and pack it channel-planar in [0, 1]
    ///
    /// Aspect ratio is not preserved. Alpha is discarded.
    ///
    /// # Errors
    /// Returns an error when `side` is zero.
    pub fn to_tensor(image: &RasterImage, side: u32) -> Result<InputTensor> {
        Self::to_tensor_with(image, &PreprocessingConfig::fixed_square(side))
    }

    /// Pack `image` according to a full preprocessing configuration
    ///
    /// With `input_side == None` the raster is packed at its own resolution.
    ///
    /// # Errors
    /// Invalid preprocessing parameters (zero side, zero std)
    pub fn to_tensor_with(image: &RasterImage, config: &PreprocessingConfig) -> Result<InputTensor> {
        config.validate()?;
        let rgb = Self::resample_rgb(image, config.input_side)?;
        let (width, height) = rgb.dimensions();
        let data = Self::pack(&rgb, config);
        Ok(InputTensor {
            side: config.input_side.unwrap_or(width.max(height)),
            data,
        })
    }

    /// Drop alpha and resample to the configured square, if any
    fn resample_rgb(image: &RasterImage, input_side: Option<u32>) -> Result<RgbImage> {
        let rgba: RgbaImage = image.to_rgba_image()?;
        let resized = match input_side {
            Some(0) => {
                return Err(BgRemovalError::config_value_error("input side", 0, "1 or more"))
            },
            Some(side) if rgba.dimensions() != (side, side) => {
                log::trace!(
                    "Resampling {}x{} to {}x{}",
                    image.width(),
                    image.height(),
                    side,
                    side
                );
                imageops::resize(&rgba, side, side, RESAMPLE_FILTER)
            },
            _ => rgba,
        };

        let (width, height) = resized.dimensions();
        Ok(RgbImage::from_fn(width, height, |x, y| {
            let p = resized.get_pixel(x, y);
            image::Rgb([p[0], p[1], p[2]])
        }))
    }

    /// Scale to [0, 1], apply mean/std and write in the configured layout
    fn pack(rgb: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = rgb.dimensions();
        let (w, h) = (width as usize, height as usize);
        let mean = config.normalization_mean;
        let std = config.normalization_std;

        let mut tensor = match config.layout {
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
        };

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor allocated from the raster's own dimensions
        for (y, row) in rgb.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for c in 0..3 {
                    let value = (f32::from(pixel[c]) / 255.0 - mean[c]) / std[c];
                    match config.layout {
                        TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                        TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                    }
                }
            }
        }

        tensor
    }
}
