//! Numeric pipeline utilities
//!
//! - [`preprocessing`]: raster to model input tensor
//! - [`postprocessing`]: model mask to raster alpha
//! - [`compositing`]: alpha-only edge softening and background fills

pub mod compositing;
pub mod postprocessing;
pub mod preprocessing;

pub use compositing::{composite_over, soften_edges};
pub use postprocessing::{probability_to_alpha, MaskPostprocessor};
pub use preprocessing::{TensorPreprocessor, RESAMPLE_FILTER};
