//! Image I/O operations service
//!
//! Decoding of user-supplied bytes into RGBA rasters and encoding of rasters
//! into the export formats.

use crate::{
    config::ExportFormat,
    error::{BgRemovalError, Result},
    services::format::OutputFormatHandler,
    types::RasterImage,
};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
use std::path::Path;

/// Largest width or height libwebp can encode
#[cfg(feature = "webp-support")]
const WEBP_MAX_DIMENSION: u32 = 16383;

/// Service for decoding, encoding and persisting images
pub struct ImageIOService;

impl ImageIOService {
    /// Decode any supported image into an RGBA raster with alpha defaulting to 255
    ///
    /// # Errors
    /// `Decode` when the bytes are empty or not a recognizable image
    pub fn decode(bytes: &[u8]) -> Result<RasterImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::decode("Input is empty"));
        }
        let format = image::guess_format(bytes)
            .map_err(|e| BgRemovalError::decode(format!("Unrecognized image data: {}", e)))?;
        let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            BgRemovalError::decode(format!("Failed to decode {:?} image: {}", format, e))
        })?;
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::decode("Image has zero width or height"));
        }
        log::debug!(
            "Decoded {:?} image {}x{} ({:?})",
            format,
            image.width(),
            image.height(),
            image.color()
        );
        Ok(RasterImage::from_image(image.to_rgba8()))
    }

    /// Encode a raster in the requested export format
    ///
    /// `quality` applies to lossy formats only and must lie in [0, 1].
    ///
    /// # Errors
    /// - `InvalidConfig` for an out-of-range quality
    /// - `Encode` when the encoder fails or the format is not compiled in
    pub fn encode(image: &RasterImage, format: ExportFormat, quality: Option<f32>) -> Result<Vec<u8>> {
        if let Some(q) = quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(BgRemovalError::config_value_error("quality", q, "0.0-1.0"));
            }
        }
        OutputFormatHandler::validate_quality_usage(format, quality);

        match format {
            ExportFormat::Png => Self::encode_png(image),
            ExportFormat::WebP => Self::encode_webp(image, OutputFormatHandler::quality_to_webp(quality)),
        }
    }

    /// Lossless PNG with alpha
    ///
    /// # Errors
    /// `Encode` when the PNG encoder fails
    pub fn encode_png(image: &RasterImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(
                image.as_bytes(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| BgRemovalError::encode(format!("Failed to encode PNG: {}", e)))?;
        Ok(buffer)
    }

    #[cfg(feature = "webp-support")]
    fn encode_webp(image: &RasterImage, quality: f32) -> Result<Vec<u8>> {
        if image.width() > WEBP_MAX_DIMENSION || image.height() > WEBP_MAX_DIMENSION {
            return Err(BgRemovalError::encode(format!(
                "WebP cannot hold a {}x{} image (max {} px per side)",
                image.width(),
                image.height(),
                WEBP_MAX_DIMENSION
            )));
        }
        let encoder = webp::Encoder::from_rgba(image.as_bytes(), image.width(), image.height());
        let encoded = encoder
            .encode_simple(false, quality)
            .map_err(|e| BgRemovalError::encode(format!("Failed to encode WebP: {:?}", e)))?;
        if encoded.is_empty() {
            return Err(BgRemovalError::encode("WebP encoder produced no data"));
        }
        Ok(encoded.to_vec())
    }

    #[cfg(not(feature = "webp-support"))]
    fn encode_webp(_image: &RasterImage, _quality: f32) -> Result<Vec<u8>> {
        Err(BgRemovalError::encode(
            "WebP export requires the 'webp-support' feature",
        ))
    }

    /// Read an image file and decode it
    ///
    /// # Errors
    /// File read errors, then any [`ImageIOService::decode`] error
    pub async fn load_image<P: AsRef<Path>>(path: P) -> Result<RasterImage> {
        let bytes = Self::read_bytes(path).await?;
        Self::decode(&bytes)
    }

    /// Read raw bytes from a file
    ///
    /// # Errors
    /// File read errors with path context
    pub async fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        tokio::fs::read(path_ref)
            .await
            .map_err(|e| BgRemovalError::file_io_error("read image file", path_ref, &e))
    }

    /// Write encoded bytes, creating parent directories as needed
    ///
    /// # Errors
    /// Directory creation or write failures with path context
    pub async fn save_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BgRemovalError::file_io_error("create output directory", parent, &e))?;
        }
        tokio::fs::write(path_ref, bytes)
            .await
            .map_err(|e| BgRemovalError::file_io_error("write output file", path_ref, &e))
    }
}
