use std::{env, path::PathBuf};

use thiserror::Error;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_BODY_LIMIT_MB: usize = 5;
const DEFAULT_MODEL_PATH: &str = "./model/frozen_graph.pb";
const DEFAULT_CHAT_API_URL: &str = "https://router.huggingface.co/nebius/v1/chat/completions";
const DEFAULT_CHAT_MODEL: &str = "deepseek-ai/DeepSeek-V3-0324-fast";

#[derive(Debug, Error)]
#[error("{key} must be a valid {expected}, got '{value}'")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    expected: &'static str,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub url: Option<String>,
    pub download_token: Option<String>,
    pub input_op: String,
    pub output_op: String,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model: ModelConfig,
    pub chat: ChatConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let body_limit_mb = match var("BODY_LIMIT_MB") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| ConfigError {
                key: "BODY_LIMIT_MB",
                value: raw.clone(),
                expected: "integer",
            })?,
            None => DEFAULT_BODY_LIMIT_MB,
        };

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError {
                key: "PORT",
                value: raw.clone(),
                expected: "number between 0 and 65535",
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            port,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            model: ModelConfig {
                path: PathBuf::from(or("MODEL_PATH", DEFAULT_MODEL_PATH)),
                url: var("MODEL_URL"),
                download_token: var("MODEL_DOWNLOAD_TOKEN"),
                input_op: or("MODEL_INPUT_OP", "x"),
                output_op: or("MODEL_OUTPUT_OP", "Identity"),
            },
            chat: ChatConfig {
                api_url: or("CHAT_API_URL", DEFAULT_CHAT_API_URL),
                api_key: var("CHAT_API_KEY"),
                model: or("CHAT_MODEL", DEFAULT_CHAT_MODEL),
            },
        })
    }
}
