//! Image preprocessing for meter reading
//!
//! Wavelet denoising followed by grayscale conversion, optional rotation and
//! contrast limited adaptive histogram equalization.

pub mod pipeline;
pub mod steps;
pub mod wavelet;

pub use pipeline::{
    preprocess, Pipeline, PipelineConfig, PipelineInput, PreprocessingResult, StepTiming,
};
pub use steps::denoise::{denoise, soft_threshold, DenoiseParams};
pub use steps::encode::{ImagePayload, OutputFormat};
pub use steps::equalize::{equalize_adaptive, EqualizeParams};
pub use steps::rotate::Rotation;
pub use wavelet::{Wavelet, WaveletCoefficients};
