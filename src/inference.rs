//! Inference engine abstraction
//!
//! An [`InferenceEngine`] turns validated model bytes into an
//! [`InferenceSession`]; segmentation backends only ever talk to these two
//! traits, so ONNX Runtime, tract and test doubles are interchangeable.

use crate::config::EngineConfig;
use crate::error::Result;
use ndarray::{Array4, ArrayD};

/// Factory for executable model sessions
pub trait InferenceEngine: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Build a session from raw ONNX bytes
    ///
    /// # Errors
    /// - Model bytes cannot be parsed or optimized
    /// - Runtime setup failures
    fn load(&self, model: &[u8], config: &EngineConfig) -> Result<Box<dyn InferenceSession>>;
}

/// A loaded model ready to run
pub trait InferenceSession: Send {
    /// Run the model on one input tensor and return its first output
    ///
    /// # Errors
    /// - Input shape rejected by the model
    /// - Runtime failures or non-f32 outputs
    fn run(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>>;
}

/// Resolve the thread counts `0 = auto` into concrete values
///
/// Intra-op threads default to all cores, inter-op threads to a quarter.
#[must_use]
pub fn resolve_threads(config: &EngineConfig) -> (usize, usize) {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(8);

    let intra = if config.intra_threads > 0 {
        config.intra_threads
    } else {
        cores
    };
    let inter = if config.inter_threads > 0 {
        config.inter_threads
    } else {
        (cores / 4).max(1)
    };
    (intra, inter)
}
