use crate::state::AppState;
use anyhow::anyhow;
use axum::{
    extract::State,
    http::{self, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::BoxStream, stream::StreamExt, Stream};
use insightarc::{
    models::content::Content,
    models::message::{Message, MessageContent},
    models::role::Role,
    research::ResearchEvent,
    session::ResearchSession,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

pub(crate) const STREAM_FAILURE: &str = "Failed to stream chat completion";

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum MessagePart {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl IncomingMessage {
    /// Plain `content` wins; otherwise the text parts joined in order
    fn text(&self) -> String {
        if !self.content.is_empty() {
            return self.content.clone();
        }
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// Custom SSE response type that implements the Vercel AI SDK protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    pub(crate) fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let stream = self;
        let body = axum::body::Body::from_stream(stream);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .header("x-vercel-ai-data-stream", "v1")
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

// Convert incoming messages to our internal Message type
fn convert_messages(incoming: Vec<IncomingMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        let text = msg.text();
        match msg.role.as_str() {
            "user" => messages.push(Message::user().with_text(text)),
            "assistant" => {
                if !text.is_empty() {
                    messages.push(Message::assistant().with_text(text));
                }
            }
            _ => {
                tracing::warn!("Unknown role: {}", msg.role);
            }
        }
    }

    messages
}

// Protocol-specific message formatting
pub(crate) struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        // Tool calls start with "9:"
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    fn format_tool_response(id: &str, result: &Vec<Content>) -> String {
        // Tool responses start with "a:"
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    fn format_data(data: &Value) -> String {
        // Data parts start with "2:" and always carry an array
        format!("2:{}\n", json!([data]))
    }

    fn format_error(message: &str) -> String {
        let encoded = serde_json::to_string(message).unwrap_or_else(|_| String::new());
        format!("3:{}\n", encoded)
    }

    pub(crate) fn format_finish(reason: &str) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

async fn stream_message(
    message: Message,
    tx: &mpsc::Sender<String>,
) -> Result<(), mpsc::error::SendError<String>> {
    match message.role {
        Role::User => {
            // Only tool responses travel back to the client from user-role messages
            for content in message.content {
                if let MessageContent::ToolResponse(response) = content {
                    let result = match response.tool_result {
                        Ok(result) => result,
                        Err(err) => vec![Content::text(format!("Error {}", err))],
                    };
                    tx.send(ProtocolFormatter::format_tool_response(
                        &response.id,
                        &result,
                    ))
                    .await?;
                }
            }
        }
        Role::Assistant => {
            for content in message.content {
                match content {
                    MessageContent::ToolRequest(request) => {
                        if let Ok(tool_call) = request.tool_call {
                            tx.send(ProtocolFormatter::format_tool_call(
                                &request.id,
                                &tool_call.name,
                                &tool_call.arguments,
                            ))
                            .await?;
                        } else {
                            // An invalid call stays in the history; its error response follows
                            tx.send(ProtocolFormatter::format_tool_call(
                                &request.id,
                                "invalid name",
                                &json!({}),
                            ))
                            .await?;
                        }
                    }
                    MessageContent::Text(text) => {
                        for line in text.text.lines() {
                            let modified_line = format!("{}\n", line);
                            tx.send(ProtocolFormatter::format_text(&modified_line))
                                .await?;
                        }
                    }
                    MessageContent::ToolResponse(_) => {
                        // Tool responses should only come from the user
                        continue;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn stream_event(
    event: ResearchEvent,
    tx: &mpsc::Sender<String>,
) -> Result<(), mpsc::error::SendError<String>> {
    match event {
        ResearchEvent::Message(message) => stream_message(message, tx).await,
        ResearchEvent::ReportSaved { path } => {
            tx.send(ProtocolFormatter::format_data(&json!({
                "type": "report_saved",
                "path": path,
            })))
            .await
        }
    }
}

/// Forward `events` to the client.
///
/// `ready` resolves once the first event (or the end of the stream) is known, so the
/// handler can still answer with a plain 500 when the backend fails up front. After
/// that, failures become an error part followed by an `error` finish.
pub(crate) async fn pump_events(
    events: anyhow::Result<BoxStream<'_, anyhow::Result<ResearchEvent>>>,
    tx: mpsc::Sender<String>,
    mut ready: oneshot::Sender<bool>,
) -> anyhow::Result<()> {
    let mut stream = match events {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to start reply stream: {}", e);
            let _ = ready.send(false);
            return Err(e);
        }
    };

    let first = tokio::select! {
        first = stream.next() => first,
        _ = ready.closed() => return Err(anyhow!("client disconnected")),
    };
    match first {
        Some(Err(e)) => {
            tracing::error!("Error processing message: {}", e);
            let _ = ready.send(false);
            return Err(e);
        }
        Some(Ok(event)) => {
            if ready.send(true).is_err() {
                return Err(anyhow!("client disconnected"));
            }
            if let Err(e) = stream_event(event, &tx).await {
                tracing::error!("Error sending message through channel: {}", e);
                return Err(anyhow!("client disconnected"));
            }
        }
        None => {
            let _ = ready.send(true);
            let _ = tx.send(ProtocolFormatter::format_finish("stop")).await;
            return Ok(());
        }
    }

    loop {
        match timeout(Duration::from_millis(500), stream.next()).await {
            Ok(Some(Ok(event))) => {
                if let Err(e) = stream_event(event, &tx).await {
                    tracing::error!("Error sending message through channel: {}", e);
                    return Err(anyhow!("client disconnected"));
                }
            }
            Ok(Some(Err(e))) => {
                tracing::error!("Error processing message: {}", e);
                let _ = tx.send(ProtocolFormatter::format_error(&e.to_string())).await;
                let _ = tx.send(ProtocolFormatter::format_finish("error")).await;
                return Err(e);
            }
            Ok(None) => break,
            Err(_) => {
                // Heartbeat, used to detect disconnected clients and drop the running tools
                if tx.is_closed() {
                    tracing::info!("client disconnected, dropping run");
                    return Err(anyhow!("client disconnected"));
                }
            }
        }
    }

    let _ = tx.send(ProtocolFormatter::format_finish("stop")).await;
    Ok(())
}

/// Answer a plain 500 unless the first event arrived, in which case stream
pub(crate) async fn respond(rx: mpsc::Receiver<String>, ready: oneshot::Receiver<bool>) -> Response {
    match ready.await {
        Ok(true) => SseResponse::new(ReceiverStream::new(rx)).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, STREAM_FAILURE).into_response(),
    }
}

pub(crate) fn check_protocol(headers: &HeaderMap) -> Result<(), StatusCode> {
    if let Some(protocol) = headers.get("x-protocol") {
        if protocol.to_str().map(|p| p != "data").unwrap_or(true) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    Ok(())
}

async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, StatusCode> {
    check_protocol(&headers)?;

    let messages = convert_messages(request.messages);
    let mut session = ResearchSession::from_history(request.id.clone(), messages).map_err(|e| {
        tracing::warn!("Rejecting reply request: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let report_key = state.report_key(request.id.as_deref());

    let (tx, rx) = mpsc::channel(100);
    let (ready_tx, ready_rx) = oneshot::channel();

    tokio::spawn(async move {
        if let Err(e) = session.start() {
            tracing::error!("Failed to start session: {}", e);
            let _ = ready_tx.send(false);
            return;
        }

        let result = {
            let events = state.pipeline.reply(&session, report_key).await;
            pump_events(events, tx, ready_tx).await
        };

        let transition = match result {
            Ok(()) => session.finish(),
            Err(_) => session.fail(),
        };
        if let Err(e) = transition {
            tracing::error!("Invalid session transition: {}", e);
        }
        tracing::info!(session = session.id(), state = ?session.state(), "reply finished");
    });

    Ok(respond(rx, ready_rx).await)
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/ai", post(handler))
        .route("/reply", post(handler))
        .with_state(state)
}
