use crate::error::{MeterError, Result};
use crate::preprocessing::{
    DenoiseParams, EqualizeParams, OutputFormat, PipelineConfig, Wavelet,
};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "meter-preprocess-server")]
#[command(about = "Denoise and contrast-normalize utility meter photos for reading")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "METER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "METER_PORT", default_value = "9393")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 20MB)
    #[arg(long, env = "METER_MAX_FILE_SIZE", default_value = "20971520")]
    pub max_file_size: usize,

    /// Wavelet used for denoising (db1/haar, db2, db3, db4)
    #[arg(long, env = "METER_WAVELET", default_value = "db1")]
    pub wavelet: String,

    /// Wavelet decomposition levels
    #[arg(long, env = "METER_LEVELS", default_value = "2")]
    pub levels: usize,

    /// Soft threshold applied to wavelet detail coefficients
    #[arg(long, env = "METER_DENOISE_THRESHOLD", default_value = "0.1")]
    pub denoise_threshold: f64,

    /// Adaptive equalization clip limit, in (0, 1]
    #[arg(long, env = "METER_CLIP_LIMIT", default_value = "0.03")]
    pub clip_limit: f64,

    /// Quality of JPEG output images (1-100)
    #[arg(long, env = "METER_JPEG_QUALITY", default_value = "90")]
    pub jpeg_quality: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub jpeg_quality: u8,
    pub pipeline: PipelineConfig,
}

impl TryFrom<Args> for Config {
    type Error = MeterError;

    fn try_from(args: Args) -> Result<Self> {
        let pipeline = PipelineConfig {
            denoise: DenoiseParams {
                wavelet: Wavelet::parse(&args.wavelet)?,
                levels: args.levels,
                threshold: args.denoise_threshold,
            },
            equalize: EqualizeParams {
                clip_limit: args.clip_limit,
                ..Default::default()
            },
            output: OutputFormat::Jpeg {
                quality: args.jpeg_quality,
            },
        };
        pipeline.validate()?;

        Ok(Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            jpeg_quality: args.jpeg_quality,
            pipeline,
        })
    }
}
