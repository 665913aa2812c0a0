//! Export format handling service

use crate::config::ExportFormat;

/// Quality used when a lossy export does not specify one
pub const DEFAULT_QUALITY: f32 = 1.0;

/// Format metadata and quality mapping for exports
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// File extension for a format (without the dot)
    ///
    /// ```rust
    /// use local_bgremove::{ExportFormat, OutputFormatHandler};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(ExportFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(ExportFormat::WebP), "webp");
    /// ```
    #[must_use]
    pub fn get_extension(format: ExportFormat) -> &'static str {
        match format {
            ExportFormat::Png => "png",
            ExportFormat::WebP => "webp",
        }
    }

    /// MIME type for a format
    #[must_use]
    pub fn mime_type(format: ExportFormat) -> &'static str {
        match format {
            ExportFormat::Png => "image/png",
            ExportFormat::WebP => "image/webp",
        }
    }

    /// Whether the format discards information
    #[must_use]
    pub fn is_lossy(format: ExportFormat) -> bool {
        matches!(format, ExportFormat::WebP)
    }

    /// Both export formats carry an alpha channel
    #[must_use]
    pub fn supports_transparency(format: ExportFormat) -> bool {
        match format {
            ExportFormat::Png | ExportFormat::WebP => true,
        }
    }

    /// Whether this build can encode the format
    #[must_use]
    pub fn is_available(format: ExportFormat) -> bool {
        match format {
            ExportFormat::Png => true,
            ExportFormat::WebP => cfg!(feature = "webp-support"),
        }
    }

    /// Map a [0, 1] quality to libwebp's 0-100 scale
    ///
    /// Out-of-range values are clamped; `None` maps to full quality.
    #[must_use]
    pub fn quality_to_webp(quality: Option<f32>) -> f32 {
        let q = quality.unwrap_or(DEFAULT_QUALITY);
        if q.is_nan() {
            return DEFAULT_QUALITY * 100.0;
        }
        q.clamp(0.0, 1.0) * 100.0
    }

    /// Warn when a quality is supplied for a lossless export
    pub fn validate_quality_usage(format: ExportFormat, quality: Option<f32>) {
        if quality.is_some() && !Self::is_lossy(format) {
            log::warn!(
                "Quality setting is ignored for lossless {:?} export",
                format
            );
        }
    }
}
