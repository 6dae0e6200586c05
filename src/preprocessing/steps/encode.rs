use crate::error::{MeterError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::GrayImage;

/// Default JPEG quality for hand-off images
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Encoding used for the hand-off payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl OutputFormat {
    /// Parse a format name; JPEG output uses `jpeg_quality`
    pub fn parse(s: &str, jpeg_quality: u8) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Some(Self::Jpeg {
                quality: jpeg_quality,
            }),
            "png" | "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Jpeg { quality } if !(1..=100).contains(quality) => {
                Err(MeterError::InvalidParameter(format!(
                    "JPEG quality must be between 1 and 100, got {}",
                    quality
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Encoded image tagged with its mime type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Encode a single-channel image into a compressed payload
pub fn apply(image: &GrayImage, format: OutputFormat) -> Result<ImagePayload> {
    format.validate()?;

    let mut bytes = Vec::new();
    let written = match format {
        OutputFormat::Jpeg { quality } => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
        }
        OutputFormat::Png => image.write_with_encoder(PngEncoder::new(&mut bytes)),
    };
    written.map_err(|e| MeterError::EncodeFailure(e.to_string()))?;

    Ok(ImagePayload {
        mime_type: format.mime_type().to_string(),
        bytes,
    })
}
