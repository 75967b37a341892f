use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

use crate::{config::ModelConfig, error::ModelLoadError};

async fn download_file(
    url: &str,
    path: &Path,
    token: Option<&str>,
) -> Result<(), ModelLoadError> {
    tracing::info!("Downloading {} from {}", path.display(), url);

    let mut header_map = HeaderMap::new();
    if let Some(token) = token {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ModelLoadError::InvalidToken)?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::new();
    let response = client.get(url).headers(header_map).send().await?;

    if !response.status().is_success() {
        return Err(ModelLoadError::DownloadStatus(response.status()));
    }

    let bytes = response.bytes().await?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;

    tracing::info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Makes sure the model artifact is on disk, fetching it from
/// `MODEL_URL` when it is missing.
pub async fn ensure_model_exists(model: &ModelConfig) -> Result<(), ModelLoadError> {
    tracing::info!("Checking model at {}", model.path.display());
    if tokio::fs::try_exists(&model.path).await? {
        return Ok(());
    }

    match &model.url {
        Some(url) => download_file(url, &model.path, model.download_token.as_deref()).await,
        None => Err(ModelLoadError::Missing(model.path.display().to_string())),
    }
}
