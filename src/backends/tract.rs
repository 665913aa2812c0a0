//! Tract engine (pure Rust inference)
//!
//! The parsed ONNX graph is kept in its inference form and an optimized plan
//! is built per concrete input shape, so models with free spatial dimensions
//! can run at whatever resolution the caller provides.

use crate::config::EngineConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::{InferenceEngine, InferenceSession};
use ndarray::{Array4, ArrayD, IxDyn};
use std::collections::HashMap;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Plans kept per session before the cache is flushed
const MAX_CACHED_PLANS: usize = 4;

/// Tract engine
#[derive(Debug, Default, Clone, Copy)]
pub struct TractEngine;

impl TractEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&self, model: &[u8], _config: &EngineConfig) -> Result<Box<dyn InferenceSession>> {
        let load_start = instant::Instant::now();

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model))
            .map_err(|e| BgRemovalError::init(format!("Failed to load ONNX model: {e}")))?;

        log::debug!(
            "Tract model parsed in {:.2}ms",
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Box::new(TractSession {
            model,
            plans: HashMap::new(),
        }))
    }
}

/// Parsed graph plus optimized plans keyed by input shape
pub struct TractSession {
    model: InferenceModel,
    plans: HashMap<Vec<usize>, TractModel>,
}

impl TractSession {
    fn plan_for(&mut self, shape: &[usize]) -> Result<&TractModel> {
        if !self.plans.contains_key(shape) {
            if self.plans.len() >= MAX_CACHED_PLANS {
                self.plans.clear();
            }

            let plan_start = instant::Instant::now();
            let plan = self
                .model
                .clone()
                .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape.to_vec()))
                .and_then(|m| m.into_optimized())
                .and_then(|m| m.into_runnable())
                .map_err(|e| {
                    BgRemovalError::inference(format!(
                        "Failed to prepare plan for input {:?}: {e}",
                        shape
                    ))
                })?;
            log::debug!(
                "Tract plan for {:?} built in {:.2}ms",
                shape,
                plan_start.elapsed().as_secs_f64() * 1000.0
            );
            self.plans.insert(shape.to_vec(), plan);
        }

        self.plans
            .get(shape)
            .ok_or_else(|| BgRemovalError::internal("Tract plan missing after insertion"))
    }
}

impl InferenceSession for TractSession {
    fn run(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let inference_start = instant::Instant::now();
        let plan = self.plan_for(input.shape())?;

        let input_tensor = Tensor::from_shape(input.shape(), &input.iter().copied().collect::<Vec<f32>>())
            .map_err(|e| BgRemovalError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = plan
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = output_data.shape().to_vec();
        let result = ArrayD::from_shape_vec(IxDyn(&shape), output_data.iter().copied().collect())
            .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference {:?} -> {:?} in {:.2}ms",
            input.shape(),
            shape,
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }
}
