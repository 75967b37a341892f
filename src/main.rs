use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

mod chat;
mod config;
mod error;
mod interpret;
mod ledger;
mod model;
mod preprocess;
mod routes;
mod utils;

use chat::ChatClient;
use config::Config;
use ledger::Ledger;
use model::Model;
use routes::AppState;
use utils::ensure_model_exists;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        tracing::warn!("Logger already initialized: {err}");
    }

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        body_limit_bytes = config.body_limit_bytes,
        model_path = %config.model.path.display(),
        model_url = config.model.url.is_some(),
        chat_enabled = config.chat.api_key.is_some(),
        "Configuration loaded"
    );
    ensure_model_exists(&config.model).await?;

    let model = Model::load(
        &config.model.path,
        &config.model.input_op,
        &config.model.output_op,
    )
    .with_context(|| format!("Failed to load model from {}", config.model.path.display()))?;
    tracing::info!("Model loaded from {}", config.model.path.display());

    if config.chat.api_key.is_none() {
        tracing::warn!("CHAT_API_KEY is not set, /api/chat will answer 503");
    }

    let state = AppState {
        classifier: Arc::new(model),
        ledger: Arc::new(Ledger::new()),
        chat: Arc::new(ChatClient::new(config.chat.clone())),
    };
    let app = routes::router(state, config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
