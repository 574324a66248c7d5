//! HTTP ingest for forwarded gateway dispatches.
//!
//! A gateway relay posts raw dispatch envelopes to `POST /events`. Only
//! `MESSAGE_CREATE` is acted on; each one spawns an independent pipeline run.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::platform::{CandidateMessage, PlatformUser};
use crate::verify::{Lifecycle, VerificationEngine};

/// Shared state for ingest routes.
#[derive(Clone)]
pub struct IngestState {
    pub engine: Arc<VerificationEngine>,
    pub lifecycle: watch::Receiver<Lifecycle>,
    /// Bearer token the relay must present, if configured.
    pub token: Option<SecretString>,
}

/// Gateway dispatch envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[allow(dead_code)]
    op: u8,
    t: Option<String>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    d: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: PlatformUser,
    #[serde(default)]
    content: String,
}

impl From<MessageCreate> for CandidateMessage {
    fn from(m: MessageCreate) -> Self {
        Self {
            id: m.id,
            channel_id: m.channel_id,
            guild_id: m.guild_id,
            author: m.author,
            content: m.content,
        }
    }
}

/// Decode a dispatch. `Ok(None)` means a well-formed event we don't handle.
fn parse_dispatch(body: &[u8]) -> Result<Option<CandidateMessage>, IngestError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| IngestError::Malformed(e.to_string()))?;

    if envelope.t.as_deref() != Some("MESSAGE_CREATE") {
        debug!(event = ?envelope.t, seq = ?envelope.s, "Ignoring dispatch");
        return Ok(None);
    }

    let message: MessageCreate = serde_json::from_value(envelope.d)
        .map_err(|e| IngestError::Malformed(format!("MESSAGE_CREATE: {e}")))?;
    Ok(Some(message.into()))
}

fn authorized(headers: &HeaderMap, token: Option<&SecretString>) -> bool {
    let Some(expected) = token else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == expected.expose_secret())
}

/// POST /events
async fn receive_event(
    State(state): State<IngestState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !authorized(&headers, state.token.as_ref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid or missing bearer token"})),
        );
    }

    let message = match parse_dispatch(&body) {
        Ok(Some(message)) => message,
        Ok(None) => {
            return (StatusCode::OK, Json(serde_json::json!({"status": "ignored"})));
        }
        Err(e) => {
            warn!(error = %e, "Rejected malformed dispatch");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e.to_string()})),
            );
        }
    };

    let lifecycle = *state.lifecycle.borrow();
    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        engine.on_candidate_message(lifecycle, &message).await;
    });

    (StatusCode::ACCEPTED, Json(serde_json::json!({"status": "accepted"})))
}

/// GET /health
async fn health(State(state): State<IngestState>) -> impl IntoResponse {
    let lifecycle = *state.lifecycle.borrow();
    Json(serde_json::json!({
        "status": "ok",
        "lifecycle": lifecycle.label(),
        "agent": state.engine.agent().tag,
    }))
}

/// Build the ingest routes.
pub fn router(state: IngestState) -> Router {
    Router::new()
        .route("/events", post(receive_event))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` resolves.
pub async fn serve<F>(port: u16, app: Router, shutdown: F) -> Result<(), IngestError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| IngestError::Bind {
            port,
            reason: e.to_string(),
        })?;
    info!(port, "Ingest server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| IngestError::Serve(e.to_string()))
}
