use crate::config::Config;
use crate::error::MeterError;
use crate::preprocessing::{
    OutputFormat, Pipeline, PipelineInput, Rotation, StepTiming, Wavelet,
};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

const PROCESSING_TIME_HEADER: HeaderName = HeaderName::from_static("x-processing-time-ms");
const WIDTH_HEADER: HeaderName = HeaderName::from_static("x-image-width");
const HEIGHT_HEADER: HeaderName = HeaderName::from_static("x-image-height");
const STEP_TIMINGS_HEADER: HeaderName = HeaderName::from_static("x-step-timings-ms");

/// Upload formats the decoder understands
const SUPPORTED_FORMATS: [&str; 6] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/tiff",
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, MeterError> {
        let pipeline = Pipeline::new(config.pipeline.clone())?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        })
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub wavelet: Wavelet,
    pub levels: usize,
    pub denoise_threshold: f64,
    pub clip_limit: f64,
    pub output_mime_type: String,
    pub supported_wavelets: Vec<Wavelet>,
    pub supported_formats: Vec<String>,
    pub max_file_size_bytes: usize,
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .route("/preprocess", post(handle_preprocess))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = router(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle preprocessing requests
async fn handle_preprocess(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, MeterError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut content_type: Option<String> = None;
    let mut rotate: Option<String> = None;
    let mut threshold: Option<String> = None;
    let mut format: Option<String> = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MeterError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                content_type = field.content_type().map(|s| s.to_string());
                file_data = Some(field.bytes().await.map_err(|e| {
                    MeterError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "rotate" | "threshold" | "format" => {
                let value = field.text().await.map_err(|e| {
                    MeterError::InvalidRequest(format!("Invalid {}: {}", name, e))
                })?;
                match name.as_str() {
                    "rotate" => rotate = Some(value),
                    "threshold" => threshold = Some(value),
                    _ => format = Some(value),
                }
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    // Validate file was provided
    let data = file_data.ok_or(MeterError::MissingFile)?;

    // Check file size
    if data.len() > state.config.max_file_size {
        return Err(MeterError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let mime = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    if !SUPPORTED_FORMATS.contains(&mime.as_str()) {
        tracing::warn!("Received file with content type: {}", mime);
    }

    let rotation = rotate.as_deref().map(Rotation::parse).unwrap_or_default();

    let mut pipeline_config = state.pipeline.config().clone();
    if let Some(raw) = threshold {
        pipeline_config.denoise.threshold = raw.trim().parse().map_err(|e| {
            MeterError::InvalidParameter(format!("threshold '{}': {}", raw, e))
        })?;
    }
    if let Some(raw) = format {
        pipeline_config.output = OutputFormat::parse(&raw, state.config.jpeg_quality)
            .ok_or_else(|| {
                MeterError::InvalidParameter(format!("unsupported output format '{}'", raw))
            })?;
    }
    let pipeline = Pipeline::new(pipeline_config)?;

    // Each request decodes into its own buffer on a blocking worker
    let (result, payload) = tokio::task::spawn_blocking(move || {
        let image = image::load_from_memory(&data)
            .map_err(|e| MeterError::DecodeFailure(e.to_string()))?;
        let result = pipeline.process(PipelineInput::Decoded(image), rotation)?;
        let payload = result.encode(pipeline.config().output)?;
        Ok::<_, MeterError>((result, payload))
    })
    .await
    .map_err(|e| MeterError::Internal(format!("Preprocessing task failed: {}", e)))??;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    let (width, height) = result.image.dimensions();

    tracing::info!(
        "Preprocessed {}x{} image in {}ms (rotation: {}, output: {} bytes)",
        width,
        height,
        processing_time_ms,
        rotation.as_str(),
        payload.bytes.len()
    );

    Ok((
        [
            (header::CONTENT_TYPE, payload.mime_type),
            (PROCESSING_TIME_HEADER, processing_time_ms.to_string()),
            (WIDTH_HEADER, width.to_string()),
            (HEIGHT_HEADER, height.to_string()),
            (STEP_TIMINGS_HEADER, step_timings(&result.steps)),
        ],
        payload.bytes,
    )
        .into_response())
}

/// Per-step timings as `name=ms` pairs, in pipeline order
fn step_timings(steps: &[StepTiming]) -> String {
    steps
        .iter()
        .map(|step| format!("{}={}", step.name, step.time_ms))
        .collect::<Vec<_>>()
        .join(",")
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline = state.pipeline.config();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        wavelet: pipeline.denoise.wavelet,
        levels: pipeline.denoise.levels,
        denoise_threshold: pipeline.denoise.threshold,
        clip_limit: pipeline.equalize.clip_limit,
        output_mime_type: pipeline.output.mime_type().to_string(),
        supported_wavelets: Wavelet::ALL.to_vec(),
        supported_formats: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
        max_file_size_bytes: state.config.max_file_size,
    })
}
