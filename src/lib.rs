//! Meter photo preprocessing
//!
//! Conditions photographs of utility meters for downstream reading:
//! wavelet-shrinkage denoising, grayscale conversion, optional rotation and
//! contrast limited adaptive histogram equalization. The result is encoded
//! for hand-off to an external recognizer.

pub mod config;
pub mod error;
pub mod preprocessing;
pub mod recognizer;
pub mod server;

pub use error::{MeterError, Result};
pub use preprocessing::{
    denoise, equalize_adaptive, preprocess, DenoiseParams, EqualizeParams, ImagePayload,
    OutputFormat, Pipeline, PipelineConfig, PipelineInput, PreprocessingResult, Rotation, Wavelet,
};
pub use recognizer::{
    MeterReader, MeterReading, MeterReport, RecognitionRequest, Recognizer, METER_NUMBER_QUESTION,
    METER_READING_QUESTION, METER_SYSTEM_PROMPT,
};
