//! Mask postprocessing
//!
//! Brings a model-resolution probability mask back to the original raster's
//! size and writes it into the alpha channel.

use super::preprocessing::RESAMPLE_FILTER;
use crate::{
    error::{BgRemovalError, Result},
    types::{MaskTensor, RasterImage},
};
use image::{imageops, GrayImage, Luma};

/// Quantize a foreground probability to an alpha byte
#[must_use]
pub fn probability_to_alpha(p: f32) -> u8 {
    if p.is_nan() {
        return 0;
    }
    (p.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Writes probability masks into raster alpha channels
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Resample a `side x side` mask to the target size and apply it as alpha
    ///
    /// RGB of `original` is copied bit-for-bit; only alpha changes.
    ///
    /// # Errors
    /// - Mask is not `side x side`
    /// - Target size differs from `original`'s dimensions
    pub fn apply_mask(
        mask: &MaskTensor,
        side: u32,
        target_width: u32,
        target_height: u32,
        original: &RasterImage,
    ) -> Result<RasterImage> {
        if mask.width() != side || mask.height() != side {
            return Err(BgRemovalError::inference(format!(
                "Expected a {}x{} mask, got {}x{}",
                side,
                side,
                mask.width(),
                mask.height()
            )));
        }
        if original.dimensions() != (target_width, target_height) {
            return Err(BgRemovalError::internal(format!(
                "Target {}x{} does not match original {}x{}",
                target_width,
                target_height,
                original.width(),
                original.height()
            )));
        }

        let alpha = Self::resample_mask(mask, target_width, target_height)?;
        let mut output = original.clone();
        output.set_alpha_channel(&alpha)?;
        Ok(output)
    }

    /// Quantize and resample a mask of any size to `target_width x target_height`
    ///
    /// # Errors
    /// Returns an error if the quantized mask cannot be wrapped as an image.
    pub fn resample_mask(
        mask: &MaskTensor,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<u8>> {
        let quantized: Vec<u8> = mask.values().iter().map(|v| probability_to_alpha(*v)).collect();

        if mask.width() == target_width && mask.height() == target_height {
            return Ok(quantized);
        }

        let gray = GrayImage::from_raw(mask.width(), mask.height(), quantized)
            .ok_or_else(|| BgRemovalError::internal("Mask buffer does not match its dimensions"))?;
        let resized = imageops::resize(&gray, target_width, target_height, RESAMPLE_FILTER);
        Ok(resized.pixels().map(|Luma([v])| *v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_raster(width: u32, height: u32) -> RasterImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 7) as u8, (y * 3) as u8, ((x + y) * 5) as u8, 255]);
            }
        }
        RasterImage::from_rgba(width, height, data).unwrap()
    }

    #[test]
    fn test_probability_to_alpha() {
        assert_eq!(probability_to_alpha(0.0), 0);
        assert_eq!(probability_to_alpha(1.0), 255);
        assert_eq!(probability_to_alpha(0.5), 128);
        assert_eq!(probability_to_alpha(2.0), 255);
        assert_eq!(probability_to_alpha(-1.0), 0);
        assert_eq!(probability_to_alpha(f32::NAN), 0);
    }

    #[test]
    fn test_apply_mask_preserves_rgb_and_dims() {
        let original = gradient_raster(37, 23);
        let mask = MaskTensor::square(8, (0..64).map(|i| i as f32 / 63.0).collect()).unwrap();

        let output = MaskPostprocessor::apply_mask(&mask, 8, 37, 23, &original).unwrap();

        assert_eq!(output.dimensions(), original.dimensions());
        for (a, b) in output
            .as_bytes()
            .chunks_exact(4)
            .zip(original.as_bytes().chunks_exact(4))
        {
            assert_eq!(a[..3], b[..3]);
        }
    }

    #[test]
    fn test_full_mask_is_opaque() {
        let original = gradient_raster(50, 30);
        let mask = MaskTensor::square(16, vec![1.0; 256]).unwrap();
        let output = MaskPostprocessor::apply_mask(&mask, 16, 50, 30, &original).unwrap();
        assert!(output.alpha_channel().iter().all(|a| *a == 255));
    }

    #[test]
    fn test_empty_mask_is_transparent() {
        let original = gradient_raster(50, 30);
        let mask = MaskTensor::square(16, vec![0.0; 256]).unwrap();
        let output = MaskPostprocessor::apply_mask(&mask, 16, 50, 30, &original).unwrap();
        assert!(output.alpha_channel().iter().all(|a| *a == 0));
    }

    #[test]
    fn test_mask_size_mismatch() {
        let original = gradient_raster(10, 10);
        let mask = MaskTensor::square(4, vec![1.0; 16]).unwrap();
        assert!(MaskPostprocessor::apply_mask(&mask, 8, 10, 10, &original).is_err());
        assert!(MaskPostprocessor::apply_mask(&mask, 4, 12, 10, &original).is_err());
    }

    #[test]
    fn test_resample_same_size_is_quantization_only() {
        let mask = MaskTensor::new(2, 1, vec![0.25, 0.75]).unwrap();
        let alpha = MaskPostprocessor::resample_mask(&mask, 2, 1).unwrap();
        assert_eq!(alpha, vec![64, 191]);
    }
}
