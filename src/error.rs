use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeterError>;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to decode image: {0}")]
    DecodeFailure(String),

    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Failed to encode image: {0}")]
    EncodeFailure(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeterError {
    /// Stable machine-readable code, also used as the JSON `code` field
    pub fn code(&self) -> &'static str {
        match self {
            MeterError::InvalidParameter(_) => "INVALID_PARAMETER",
            MeterError::DecodeFailure(_) => "DECODE_FAILURE",
            MeterError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            MeterError::EncodeFailure(_) => "ENCODE_FAILURE",
            MeterError::Recognition(_) => "RECOGNITION_ERROR",
            MeterError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            MeterError::MissingFile => "MISSING_FILE",
            MeterError::InvalidRequest(_) => "INVALID_REQUEST",
            MeterError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            MeterError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            MeterError::DecodeFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MeterError::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            MeterError::EncodeFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MeterError::Recognition(_) => StatusCode::BAD_GATEWAY,
            MeterError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            MeterError::MissingFile => StatusCode::BAD_REQUEST,
            MeterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            MeterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for MeterError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
