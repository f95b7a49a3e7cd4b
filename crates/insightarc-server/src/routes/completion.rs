use crate::routes::reply::{check_protocol, pump_events, respond};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    prompt: String,
}

// A single bare generation, streamed with the same framing as replies
async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> Result<Response, StatusCode> {
    check_protocol(&headers)?;
    if request.prompt.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (tx, rx) = mpsc::channel(100);
    let (ready_tx, ready_rx) = oneshot::channel();

    tokio::spawn(async move {
        let events = state.pipeline.complete(request.prompt).await;
        if let Err(e) = pump_events(events, tx, ready_tx).await {
            tracing::warn!("completion ended early: {}", e);
        }
    });

    Ok(respond(rx, ready_rx).await)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/completion", post(handler))
        .with_state(state)
}
