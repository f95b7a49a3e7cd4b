use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};

async fn handler(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.pipeline.store().get(&name).await {
        Ok(document) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            document,
        )
            .into_response(),
        Err(e) => {
            tracing::debug!("report {} not served: {}", name, e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

pub fn routes(state: AppState) -> Router {
    let path = format!("{}/:name", state.url_prefix.trim_end_matches('/'));
    Router::new().route(&path, get(handler)).with_state(state)
}
