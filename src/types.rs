//! Core types for background removal operations

use crate::config::ExportFormat;
use crate::error::{BgRemovalError, Result};
use image::RgbaImage;
use ndarray::Array4;

/// Bytes per pixel of every raster handled by the pipeline
pub const CHANNELS: usize = 4;

/// Interleaved 8-bit RGBA raster, row-major, no padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterImage {
    /// Wrap an RGBA byte buffer, checking that its length matches the dimensions
    ///
    /// # Errors
    /// - Zero width or height
    /// - Buffer length differs from `width * height * 4`
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_config(format!(
                "Raster dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(BgRemovalError::invalid_config(format!(
                "RGBA buffer for {}x{} must hold {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a raster filled with a single RGBA value
    ///
    /// # Errors
    /// Same as [`RasterImage::from_rgba`]: zero width or height
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let pixels = width as usize * height as usize;
        Self::from_rgba(width, height, rgba.repeat(pixels))
    }

    /// Take ownership of a decoded `image` buffer
    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    /// Borrow this raster as an `image` buffer
    ///
    /// # Errors
    /// Never fails for rasters built through the checked constructors.
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::internal("RGBA buffer does not match raster dimensions")
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// RGBA value at `(x, y)`, or `None` outside the raster
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = self.data.get(offset..offset + CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Alpha channel copied out as one byte per pixel
    #[must_use]
    pub fn alpha_channel(&self) -> Vec<u8> {
        self.data.chunks_exact(CHANNELS).map(|px| px[3]).collect()
    }

    /// Overwrite the alpha channel, leaving RGB untouched
    ///
    /// # Errors
    /// Returns an error when `alpha` does not hold exactly one value per pixel.
    pub fn set_alpha_channel(&mut self, alpha: &[u8]) -> Result<()> {
        if alpha.len() != self.pixel_count() {
            return Err(BgRemovalError::internal(format!(
                "Alpha plane has {} values for {} pixels",
                alpha.len(),
                self.pixel_count()
            )));
        }
        for (px, a) in self.data.chunks_exact_mut(CHANNELS).zip(alpha) {
            px[3] = *a;
        }
        Ok(())
    }

    /// Whether every pixel has alpha 255
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.data.chunks_exact(CHANNELS).all(|px| px[3] == u8::MAX)
    }
}

/// Model input: one image packed as `[1, C, side, side]` or `[1, side, side, C]`
#[derive(Debug, Clone)]
pub struct InputTensor {
    /// Square side length the image was resampled to
    pub side: u32,
    /// Packed values
    pub data: Array4<f32>,
}

impl InputTensor {
    /// Number of scalar values
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Values in planar order
    #[must_use]
    pub fn as_flat(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Foreground probability per pixel, row-major, clamped to [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct MaskTensor {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl MaskTensor {
    /// Wrap mask values, clamping each into [0, 1]
    ///
    /// # Errors
    /// Returns an error when the value count does not match the dimensions.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if width == 0 || height == 0 || values.len() != expected {
            return Err(BgRemovalError::inference(format!(
                "Mask of {}x{} cannot hold {} values",
                width,
                height,
                values.len()
            )));
        }
        let values = values
            .into_iter()
            .map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
            .collect();
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Square mask of side `side`
    ///
    /// # Errors
    /// Returns an error when `values.len() != side * side`.
    pub fn square(side: u32, values: Vec<f32>) -> Result<Self> {
        Self::new(side, side, values)
    }

    /// Extract the first plane of a `[1, 1, side, side]`-like model output
    ///
    /// Extra leading planes (some models emit several side outputs) are ignored.
    ///
    /// # Errors
    /// Returns an error when the output holds fewer than `side * side` values.
    pub fn from_model_output(output: &[f32], side: u32) -> Result<Self> {
        let plane = side as usize * side as usize;
        let first = output.get(..plane).ok_or_else(|| {
            BgRemovalError::inference(format!(
                "Model output has {} values, expected at least {}",
                output.len(),
                plane
            ))
        })?;
        Self::square(side, first.to_vec())
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Outcome of a completed removal request
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Decoded input as it went into the backend
    pub original: RasterImage,
    /// Input with background alpha applied (and optional softening/compositing)
    pub processed: RasterImage,
    /// Encoding of the original in the requested format
    pub original_encoded: Vec<u8>,
    /// Encoding of the processed image in the requested format
    pub processed_encoded: Vec<u8>,
    /// Format of both encodings
    pub format: ExportFormat,
    /// Width of both rasters
    pub width: u32,
    /// Height of both rasters
    pub height: u32,
    /// Per-phase timings
    pub timings: ProcessingTimings,
}

impl ProcessedImage {
    /// Write the processed encoding to disk
    ///
    /// # Errors
    /// File system errors while writing
    pub fn save_processed<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), &self.processed_encoded)
            .map_err(|e| BgRemovalError::file_io_error("write output", path.as_ref(), &e))
    }

    /// Fraction of pixels the mask kept fully or partially visible
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        let total = self.processed.pixel_count();
        if total == 0 {
            return 0.0;
        }
        let visible = self
            .processed
            .as_bytes()
            .chunks_exact(CHANNELS)
            .filter(|px| px[3] > 0)
            .count();
        visible as f32 / total as f32
    }
}

/// Detailed timing breakdown for one request
#[derive(Debug, Clone, Default)]
pub struct ProcessingTimings {
    /// Model acquisition and session creation (0 when already loaded)
    pub model_load_ms: u64,
    /// Input decoding
    pub image_decode_ms: u64,
    /// Segmentation, including pre/postprocessing
    pub segmentation_ms: u64,
    /// Edge softening and background compositing
    pub postprocessing_ms: u64,
    /// Output encoding
    pub encode_ms: u64,
    /// Total request time
    pub total_ms: u64,
}
