use crate::error::{MeterError, Result};
use crate::preprocessing::wavelet::{wavedec2, waverec2, Wavelet};
use image::{GrayImage, Luma};
use ndarray::Array2;

/// Default soft-threshold applied to detail coefficients
pub const DEFAULT_THRESHOLD: f64 = 0.1;
/// Default decomposition depth
pub const DEFAULT_LEVELS: usize = 2;

/// Wavelet shrinkage parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DenoiseParams {
    pub wavelet: Wavelet,
    pub levels: usize,
    pub threshold: f64,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            wavelet: Wavelet::default(),
            levels: DEFAULT_LEVELS,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl DenoiseParams {
    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Err(MeterError::InvalidParameter(
                "decomposition levels must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(MeterError::InvalidParameter(format!(
                "denoise threshold must be a finite value >= 0, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Pipeline step wrapper around [`denoise`]
pub fn apply(image: GrayImage, params: &DenoiseParams) -> Result<GrayImage> {
    denoise(&image, params)
}

/// Wavelet-shrinkage denoising
///
/// Decomposes the image, soft-thresholds every detail sub-band (the coarsest
/// approximation is kept as is), reconstructs, then rounds and clamps back to
/// 8-bit samples at the original size.
pub fn denoise(image: &GrayImage, params: &DenoiseParams) -> Result<GrayImage> {
    params.validate()?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(MeterError::InvalidParameter(format!(
            "cannot denoise an empty {}x{} image",
            width, height
        )));
    }

    let (rows, cols) = (height as usize, width as usize);
    let plane = Array2::from_shape_fn((rows, cols), |(y, x)| {
        image.get_pixel(x as u32, y as u32).0[0] as f64
    });

    let mut coeffs = wavedec2(&plane, params.wavelet, params.levels)?;
    let threshold = params.threshold;
    coeffs.map_details(|c| soft_threshold(c, threshold));
    let restored = waverec2(&coeffs)?;

    if restored.nrows() < rows || restored.ncols() < cols {
        return Err(MeterError::DimensionMismatch {
            expected: (rows, cols),
            actual: restored.dim(),
        });
    }

    tracing::debug!(
        "Denoised {}x{} image ({}, {} levels, threshold {})",
        width,
        height,
        params.wavelet.as_str(),
        params.levels,
        threshold
    );

    Ok(GrayImage::from_fn(width, height, |x, y| {
        Luma([to_sample(restored[[y as usize, x as usize]])])
    }))
}

/// Soft-threshold shrinkage: `sign(c) * max(|c| - threshold, 0)`
pub fn soft_threshold(c: f64, threshold: f64) -> f64 {
    let magnitude = c.abs() - threshold;
    if magnitude > 0.0 {
        c.signum() * magnitude
    } else {
        0.0
    }
}

fn to_sample(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
