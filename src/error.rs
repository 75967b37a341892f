use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,
    #[error(transparent)]
    Unsupported(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),
    #[error("tensorflow: {0}")]
    Tensorflow(String),
    #[error("model returned an empty output tensor")]
    EmptyOutput,
    #[error("inference worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model not found at {0} and MODEL_URL is not set")]
    Missing(String),
    #[error("failed to download model: {0}")]
    Download(#[from] reqwest::Error),
    #[error("model download returned {0}")]
    DownloadStatus(reqwest::StatusCode),
    #[error("invalid download token")]
    InvalidToken,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),
    #[error("failed to import graph: {0}")]
    Tensorflow(String),
}

// Only the message is kept; `Status` wraps a raw TF handle.
impl From<tensorflow::Status> for InferenceError {
    fn from(status: tensorflow::Status) -> Self {
        InferenceError::Tensorflow(status.to_string())
    }
}

impl From<tensorflow::Status> for ModelLoadError {
    fn from(status: tensorflow::Status) -> Self {
        ModelLoadError::Tensorflow(status.to_string())
    }
}

#[derive(Debug, Error)]
#[error("probability {0} is outside [0, 1]")]
pub struct InvalidProbabilityError(pub f64);

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat API key is not configured")]
    NotConfigured,
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("no response content found in API response")]
    EmptyReply,
}

/// Per-request failures, translated into status-coded JSON bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    NoFile,
    #[error("Empty message")]
    EmptyMessage,
    #[error("Invalid request body: {details}")]
    InvalidBody { status: StatusCode, details: String },
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    InvalidProbability(#[from] InvalidProbabilityError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFile | ApiError::EmptyMessage | ApiError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidBody { status, .. } => *status,
            ApiError::Multipart(err) => err.status(),
            ApiError::Inference(_) | ApiError::InvalidProbability(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Chat(ChatError::EmptyReply) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Chat(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::NoFile | ApiError::EmptyMessage => json!({ "error": self.to_string() }),
            ApiError::InvalidBody { details, .. } => json!({
                "error": "Invalid request body",
                "details": details,
            }),
            ApiError::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => json!({
                "error": "Upload too large",
                "details": err.to_string(),
            }),
            ApiError::Multipart(err) => json!({
                "error": "Malformed upload",
                "details": err.to_string(),
            }),
            ApiError::Decode(err) => json!({
                "error": "Unsupported image format",
                "details": err.to_string(),
            }),
            ApiError::Inference(_) | ApiError::InvalidProbability(_) => json!({
                "error": "Image processing failed",
                "details": self.to_string(),
            }),
            ApiError::Chat(ChatError::EmptyReply) => json!({
                "error": format!("An unexpected error occurred. Please try again. Error: {self}"),
            }),
            ApiError::Chat(err) => json!({
                "error": format!(
                    "I'm having trouble connecting to the AI service. Please try again later. Error: {err}"
                ),
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        } else {
            tracing::warn!("rejected request: {self}");
        }
        (status, Json(self.body())).into_response()
    }
}
