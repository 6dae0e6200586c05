use crate::error::{MeterError, Result};
use image::{DynamicImage, GrayImage, ImageReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::steps::{self, denoise::DenoiseParams, encode::ImagePayload, encode::OutputFormat};
use super::steps::{equalize::EqualizeParams, rotate::Rotation};

/// Image handed to the pipeline
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// Encoded image on disk, decoded on entry
    Path(PathBuf),
    /// Already decoded raster
    Decoded(DynamicImage),
}

impl PipelineInput {
    fn load(self) -> Result<DynamicImage> {
        match self {
            Self::Path(path) => {
                // Format comes from the file content, not its extension
                let reader = ImageReader::open(&path)
                    .and_then(|reader| reader.with_guessed_format())
                    .map_err(|e| {
                        MeterError::DecodeFailure(format!("{}: {}", path.display(), e))
                    })?;
                reader.decode().map_err(|e| {
                    MeterError::DecodeFailure(format!("{}: {}", path.display(), e))
                })
            }
            Self::Decoded(image) => Ok(image),
        }
    }
}

impl From<DynamicImage> for PipelineInput {
    fn from(image: DynamicImage) -> Self {
        Self::Decoded(image)
    }
}

impl From<GrayImage> for PipelineInput {
    fn from(image: GrayImage) -> Self {
        Self::Decoded(DynamicImage::ImageLuma8(image))
    }
}

impl From<PathBuf> for PipelineInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for PipelineInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Parameters for one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub denoise: DenoiseParams,
    pub equalize: EqualizeParams,
    pub output: OutputFormat,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.denoise.validate()?;
        self.equalize.validate()?;
        self.output.validate()
    }
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone)]
pub struct PreprocessingResult {
    /// Preprocessed image
    pub image: GrayImage,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Rotation applied
    pub rotation: Rotation,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

impl PreprocessingResult {
    /// Encode the final image for the recognition hand-off
    pub fn encode(&self, format: OutputFormat) -> Result<ImagePayload> {
        steps::encode::apply(&self.image, format)
    }
}

/// Denoise and enhance pipeline
///
/// Holds configuration only; every call works on its own buffers, so one
/// pipeline can serve concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run decode, grayscale, denoise, rotate and equalize in order
    pub fn process(&self, input: PipelineInput, rotation: Rotation) -> Result<PreprocessingResult> {
        let start = Instant::now();
        let mut steps_timing = Vec::new();

        let decoded = self.run_step("decode", input, &mut steps_timing, PipelineInput::load)?;
        // The denoiser works on a single channel, so luminance is taken up front
        let mut img = self.run_step("grayscale", decoded, &mut steps_timing, |img| {
            Ok(steps::grayscale::apply(img))
        })?;

        img = self.run_step("denoise", img, &mut steps_timing, |img| {
            steps::denoise::apply(img, &self.config.denoise)
        })?;
        img = self.run_step("rotate", img, &mut steps_timing, |img| {
            Ok(steps::rotate::apply(img, rotation))
        })?;
        img = self.run_step("equalize", img, &mut steps_timing, |img| {
            steps::equalize::apply(img, &self.config.equalize)
        })?;

        Ok(PreprocessingResult {
            image: img,
            total_time_ms: start.elapsed().as_millis() as u64,
            rotation,
            steps: steps_timing,
        })
    }

    fn run_step<I, O, F>(
        &self,
        name: &str,
        input: I,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<O>
    where
        F: FnOnce(I) -> Result<O>,
    {
        let step_start = Instant::now();
        let result = step_fn(input)?;
        let time_ms = step_start.elapsed().as_millis() as u64;
        tracing::debug!("Preprocessing step '{}' took {}ms", name, time_ms);
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms,
        });
        Ok(result)
    }
}

/// Preprocess with the default configuration
pub fn preprocess(input: impl Into<PipelineInput>, rotation: Rotation) -> Result<GrayImage> {
    Pipeline::default()
        .process(input.into(), rotation)
        .map(|result| result.image)
}
