use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    config::ChatConfig,
    error::ChatError,
    interpret::Verdict,
    ledger::PredictionRecord,
};

const SYSTEM_PROMPT: &str = "You are PneumoScan AI, a helpful and empathetic medical assistant specializing in pneumonia detection.
Respond like a friendly healthcare provider: explain things simply, avoid internal reasoning or planning steps in your answers.
Focus only on answering the user's questions in a warm, conversational tone. Never reveal internal logic or thought process.
Always remind the user to consult a real doctor for medical advice.";

const NO_CONTEXT: &str = "No recent scan results available.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub choices: Vec<ReplyChoice>,
    pub usage: Value,
    pub context_used: bool,
}

#[derive(Debug, Serialize)]
pub struct ReplyChoice {
    pub message: ReplyContent,
}

#[derive(Debug, Serialize)]
pub struct ReplyContent {
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Summary of the latest scan for the assistant, if there is one.
pub fn scan_context(record: Option<&PredictionRecord>) -> Option<String> {
    let record = record?;
    let diagnosis = match record.verdict {
        Verdict::Positive => "likely positive for pneumonia",
        Verdict::Negative => "likely negative for pneumonia",
    };
    Some(format!(
        "\nUser's most recent chest X-ray analysis:\n- Diagnosis: {} (confidence: {:.0}%)\n- File: {}\n- Time: {}\n",
        diagnosis,
        record.probability * 100.0,
        record.filename,
        record.timestamp,
    ))
}

pub fn build_messages(user_message: &str, context: Option<&str>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new("system", SYSTEM_PROMPT),
        ChatMessage::new(
            "user",
            format!(
                "{}\n\nUser question: {}",
                context.unwrap_or(NO_CONTEXT),
                user_message
            ),
        ),
    ]
}

/// Request body for the upstream chat completion endpoint.
pub fn completion_payload(model: &str, messages: Vec<ChatMessage>) -> Value {
    json!({
        "messages": messages,
        "parameters": {
            "temperature": 0.7,
            "max_new_tokens": 300,
            "return_full_text": false,
            "repetition_penalty": 1.2
        },
        "model": model,
    })
}

/// Forwards chat messages to a remote chat completion endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn complete(
        &self,
        user_message: &str,
        latest: Option<&PredictionRecord>,
    ) -> Result<ChatReply, ChatError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ChatError::NotConfigured)?;

        let context = scan_context(latest);
        let payload = completion_payload(
            &self.config.model,
            build_messages(user_message, context.as_deref()),
        );

        tracing::debug!(context_used = context.is_some(), "forwarding chat message");
        let completion: Completion = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ChatError::EmptyReply)?;

        Ok(ChatReply {
            choices: vec![ReplyChoice {
                message: ReplyContent { content },
            }],
            usage: completion.usage.unwrap_or_else(|| json!({})),
            context_used: context.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        http::{header, HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };

    use super::*;

    #[derive(Default)]
    struct Captured {
        authorization: Option<String>,
        body: Option<Value>,
    }

    /// Local completion endpoint answering every request with `reply`.
    fn spawn_upstream(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&captured);
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let sink = Arc::clone(&sink);
                let reply = reply.clone();
                async move {
                    {
                        let mut seen = sink.lock().unwrap();
                        seen.authorization = headers
                            .get(header::AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        seen.body = Some(body);
                    }
                    (status, Json(reply))
                }
            }),
        );

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service());
        tokio::spawn(server);

        (format!("http://{addr}/v1/chat/completions"), captured)
    }

    fn client_for(api_url: String) -> ChatClient {
        ChatClient::new(ChatConfig {
            api_url,
            api_key: Some("secret".into()),
            model: "test-model".into(),
        })
    }

    fn record(verdict: Verdict, probability: f64) -> PredictionRecord {
        PredictionRecord {
            id: "20240301120000".into(),
            filename: "scan.png".into(),
            verdict,
            probability,
            timestamp: "2024-03-01T12:00:00.000000".into(),
        }
    }

    #[test]
    fn no_record_means_no_context() {
        assert!(scan_context(None).is_none());
        let messages = build_messages("hi", None);
        assert_eq!(messages[1].content, "No recent scan results available.\n\nUser question: hi");
    }

    #[test]
    fn context_describes_latest_scan() {
        let context = scan_context(Some(&record(Verdict::Positive, 0.8732))).unwrap();
        assert!(context.contains("- Diagnosis: likely positive for pneumonia (confidence: 87%)"));
        assert!(context.contains("- File: scan.png"));
        assert!(context.contains("- Time: 2024-03-01T12:00:00.000000"));
    }

    #[test]
    fn negative_scan_reports_raw_probability() {
        let context = scan_context(Some(&record(Verdict::Negative, 0.12))).unwrap();
        assert!(context.contains("likely negative for pneumonia (confidence: 12%)"));
    }

    #[test]
    fn messages_lead_with_system_prompt() {
        let messages = build_messages("What are the symptoms?", Some("ctx"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.starts_with("You are PneumoScan AI"));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "ctx\n\nUser question: What are the symptoms?");
    }

    #[tokio::test]
    async fn missing_api_key_is_reported() {
        let client = ChatClient::new(ChatConfig {
            api_url: "http://127.0.0.1:1/v1/chat/completions".into(),
            api_key: None,
            model: "test".into(),
        });
        let err = client.complete("hello", None).await.unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured));
    }

    #[test]
    fn payload_carries_generation_parameters() {
        let payload = completion_payload("test-model", build_messages("hi", None));

        assert_eq!(payload["model"], "test-model");
        assert_eq!(payload["parameters"]["temperature"], 0.7);
        assert_eq!(payload["parameters"]["max_new_tokens"], 300);
        assert_eq!(payload["parameters"]["return_full_text"], false);
        assert_eq!(payload["parameters"]["repetition_penalty"], 1.2);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn reply_is_forwarded_with_bearer_auth() {
        let (url, captured) = spawn_upstream(
            StatusCode::OK,
            json!({
                "choices": [{ "message": { "content": "  Rest and fluids.  " } }],
                "usage": { "total_tokens": 42 }
            }),
        );

        let latest = record(Verdict::Positive, 0.9);
        let reply = client_for(url)
            .complete("What now?", Some(&latest))
            .await
            .unwrap();

        assert_eq!(reply.choices[0].message.content, "Rest and fluids.");
        assert_eq!(reply.usage["total_tokens"], 42);
        assert!(reply.context_used);

        let seen = captured.lock().unwrap();
        assert_eq!(seen.authorization.as_deref(), Some("Bearer secret"));
        let body = seen.body.as_ref().unwrap();
        assert_eq!(body["model"], "test-model");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("likely positive for pneumonia"));
    }

    #[tokio::test]
    async fn blank_reply_is_empty_reply() {
        let (url, _) = spawn_upstream(
            StatusCode::OK,
            json!({ "choices": [{ "message": { "content": "   " } }] }),
        );

        let err = client_for(url).complete("hello", None).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyReply));
    }

    #[tokio::test]
    async fn upstream_error_status_is_request_error() {
        let (url, _) = spawn_upstream(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "overloaded" }),
        );

        let err = client_for(url).complete("hello", None).await.unwrap_err();
        assert!(matches!(err, ChatError::Request(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_request_error() {
        let err = client_for("http://127.0.0.1:1/v1/chat/completions".into())
            .complete("hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Request(_)));
    }
}
