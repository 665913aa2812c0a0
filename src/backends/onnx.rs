//! ONNX Runtime engine
//!
//! Sessions are built from in-memory model bytes with graph optimization
//! level 3. Hardware execution providers are only registered when ONNX
//! Runtime reports them available; otherwise the session runs on CPU.

use crate::config::{EngineConfig, ExecutionProvider};
use crate::error::{BgRemovalError, Result};
use crate::inference::{resolve_threads, InferenceEngine, InferenceSession};
use ndarray::{Array4, ArrayD, IxDyn};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime engine
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxEngine;

impl OnnxEngine {
    /// Create the engine
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Hardware providers to register for the requested execution provider
    fn providers_for(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = || OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default();
        let coreml_available = || OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    providers.push(cuda.clone().build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::Auto => {
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda.clone().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
            },
        }
        providers
    }
}

impl InferenceEngine for OnnxEngine {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn load(&self, model: &[u8], config: &EngineConfig) -> Result<Box<dyn InferenceSession>> {
        let load_start = instant::Instant::now();

        let mut builder = Session::builder()
            .map_err(|e| BgRemovalError::init(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| BgRemovalError::init(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::providers_for(config.execution_provider);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                BgRemovalError::init(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let (intra_threads, inter_threads) = resolve_threads(config);
        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::init(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::init(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(model)
            .map_err(|e| {
                BgRemovalError::init(format!("Failed to create session from model data: {e}"))
            })?;

        log::debug!(
            "ONNX session ready in {:.0}ms ({} intra-op, {} inter-op threads, provider {})",
            load_start.elapsed().as_secs_f64() * 1000.0,
            intra_threads,
            inter_threads,
            config.execution_provider
        );

        Ok(Box::new(OnnxSession { session }))
    }
}

/// A committed ONNX Runtime session
pub struct OnnxSession {
    session: Session,
}

impl InferenceSession for OnnxSession {
    fn run(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let inference_start = instant::Instant::now();

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs avoid depending on graph tensor names
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| BgRemovalError::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output.shape().to_vec();
        let data: Vec<f32> = output.iter().copied().collect();
        let result = ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "ONNX inference {:?} -> {:?} in {:.2}ms",
            input.shape(),
            shape,
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }
}
