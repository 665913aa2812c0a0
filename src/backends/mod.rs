//! Inference engine implementations
//!
//! - ONNX Runtime engine (high performance, GPU acceleration)
//! - Tract engine (pure Rust, no external dependencies)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxEngine;

#[cfg(feature = "tract")]
pub use self::tract::TractEngine;

use crate::config::EngineKind;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceEngine;
use std::sync::Arc;

/// Instantiate the engine for a kind, if it was compiled in
///
/// # Errors
/// `Init` when the crate was built without the engine's feature
pub fn engine_for(kind: EngineKind) -> Result<Arc<dyn InferenceEngine>> {
    match kind {
        #[cfg(feature = "onnx")]
        EngineKind::Onnx => Ok(Arc::new(OnnxEngine::new())),
        #[cfg(feature = "tract")]
        EngineKind::Tract => Ok(Arc::new(TractEngine::new())),
        #[allow(unreachable_patterns)]
        other => Err(BgRemovalError::init(format!(
            "{:?} engine is not available in this build (enable the '{}' feature)",
            other,
            feature_name(other)
        ))),
    }
}

/// Whether an engine kind was compiled in
#[must_use]
pub fn is_engine_available(kind: EngineKind) -> bool {
    match kind {
        EngineKind::Onnx => cfg!(feature = "onnx"),
        EngineKind::Tract => cfg!(feature = "tract"),
    }
}

fn feature_name(kind: EngineKind) -> &'static str {
    match kind {
        EngineKind::Onnx => "onnx",
        EngineKind::Tract => "tract",
    }
}
