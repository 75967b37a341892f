use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    chat::{ChatClient, ChatReply, ChatRequest},
    error::{ApiError, InferenceError},
    interpret::{interpret, DiagnosticResult, THRESHOLD},
    ledger::Ledger,
    model::Classifier,
    preprocess,
};

#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub ledger: Arc<Ledger>,
    pub chat: Arc<ChatClient>,
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/predict", post(predict_handler))
        .route("/api/chat", post(chat_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({ "status": "Backend is running" }))
}

async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DiagnosticResult>, ApiError> {
    // Anything that is not a multipart form carries no file.
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("not a multipart upload: {}", rejection.body_text());
        ApiError::NoFile
    })?;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let image_data = field.bytes().await?;
            upload = Some((filename, image_data));
            break;
        }
    }

    let (filename, image_data) = upload.ok_or(ApiError::NoFile)?;
    if filename.is_empty() {
        return Err(ApiError::NoFile);
    }

    // Decoding and the forward pass are CPU bound.
    let classifier = Arc::clone(&state.classifier);
    let probability = tokio::task::spawn_blocking(move || -> Result<f64, ApiError> {
        let tensor = preprocess::decode(&image_data)?;
        Ok(classifier.predict(&tensor)?)
    })
    .await
    .map_err(|err| InferenceError::Worker(err.to_string()))??;

    let result = interpret(probability, THRESHOLD)?;
    let id = state.ledger.record(&filename, &result);
    tracing::info!(
        %id,
        %filename,
        verdict = ?result.verdict,
        probability,
        recorded = state.ledger.len(),
        "prediction complete"
    );

    Ok(Json(result))
}

async fn chat_handler(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = request.map_err(|rejection| ApiError::InvalidBody {
        status: rejection.status(),
        details: rejection.body_text(),
    })?;
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::EmptyMessage);
    }

    let latest = state.ledger.most_recent();
    let reply = state.chat.complete(message, latest.as_ref()).await?;
    Ok(Json(reply))
}
