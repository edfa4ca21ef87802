//! HTTP surface: chat completions plus the admin policy routes

use crate::mock;
use aiguard_core::{Completion, FinishReason, StreamEvent};
use aiguard_policy::EffectiveRules;
use aiguard_stream::{Orchestrator, ScriptedGenerator};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/admin/policies/reload", post(reload_policies))
        .route("/admin/policies/effective", get(effective_policies))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

/// Transport-level failure (generator or reload errors). Policy violations
/// never take this path; they surface as `content_filter` finish reasons.
struct ApiError(aiguard_core::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": self.0.to_string()})),
        )
            .into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let prompt = request
        .messages
        .iter()
        .rfind(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let config = state.orchestrator.config();
    let mut generator = ScriptedGenerator::new(mock::demo_text(&prompt), config.chunk_chars)
        .with_delay(config.per_chunk_delay);

    if request.stream {
        let (tx, rx) = mpsc::channel(32);
        let orchestrator = state.orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.stream(&prompt, &mut generator, &tx).await {
                error!(error = %e, "streaming session failed");
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .map(|event| Ok::<_, Infallible>(sse_event(event)));

        Ok(Sse::new(stream).into_response())
    } else {
        let completion = state
            .orchestrator
            .complete(&prompt, &mut generator)
            .await
            .map_err(ApiError)?;
        Ok(Json(completion_body(&completion)).into_response())
    }
}

async fn reload_policies(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let revision = state.orchestrator.engine().refresh().map_err(ApiError)?;
    Ok(Json(json!({"status": "ok", "revision": revision})))
}

async fn effective_policies(State(state): State<Arc<AppState>>) -> Json<EffectiveRules> {
    Json(state.orchestrator.engine().effective())
}

/// OpenAI-style `chat.completion.chunk` payload for one stream event
fn sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Delta { text } => Event::default().data(chunk_body(Some(&text), None).to_string()),
        StreamEvent::Finished { reason } => {
            Event::default().data(chunk_body(None, Some(reason)).to_string())
        }
        StreamEvent::Done => Event::default().data("[DONE]"),
    }
}

fn chunk_body(content: Option<&str>, finish_reason: Option<FinishReason>) -> Value {
    let delta = match content {
        Some(text) => json!({"content": text}),
        None => json!({}),
    };
    json!({
        "id": Uuid::new_v4().to_string(),
        "object": "chat.completion.chunk",
        "choices": [{
            "delta": delta,
            "index": 0,
            "finish_reason": finish_reason,
        }]
    })
}

fn completion_body(completion: &Completion) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "object": "chat.completion",
        "choices": [{
            "message": {"content": completion.content},
            "index": 0,
            "finish_reason": completion.finish_reason,
        }]
    })
}
