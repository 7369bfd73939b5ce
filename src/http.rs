use crate::frame::FrameMessage;
use crate::node::{Node, NodeStatus};
use crate::services::actuator::ActuatorState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

const FRAME_EVENT: &str = "server2web";
const TOGGLE_EVENT: &str = "toggle clicked";
const ERROR_EVENT: &str = "error";

#[derive(Clone)]
pub struct HttpState {
    pub node: Node,
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    state: ActuatorState,
}

#[derive(Debug, Deserialize)]
struct ClientEvent {
    event: String,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_status(State(state): State<HttpState>) -> Json<NodeStatus> {
    Json(state.node.status().await)
}

async fn post_toggle(
    State(state): State<HttpState>,
) -> Result<Json<ToggleResponse>, (StatusCode, String)> {
    let new_state = state
        .node
        .on_toggle_command()
        .await
        .map_err(|err| (StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;
    Ok(Json(ToggleResponse { state: new_state }))
}

async fn viewer_socket(State(state): State<HttpState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_viewer(state.node, socket))
}

/// One viewer connection: attach on connect, forward frames, detach on close.
async fn run_viewer(node: Node, socket: WebSocket) {
    let session_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let mut frames = match node.on_viewer_attach(session_id).await {
        Ok(frames) => frames,
        Err(err) => {
            tracing::info!(session = %session_id, error = %err, "viewer rejected");
            let rejection = Message::Text(error_event(&err.to_string()).into());
            if let Err(err) = sender.send(rejection).await {
                tracing::debug!(session = %session_id, error = %err, "could not notify rejected viewer");
                return;
            }
            sender.send(Message::Close(None)).await.ok();
            return;
        }
    };

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(err) = sender.send(Message::Text(frame_event(&frame).into())).await {
                    tracing::debug!(session = %session_id, error = %err, "viewer send failed");
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_event(&node, session_id, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(session = %session_id, error = %err, "viewer socket error");
                    break;
                }
            },
        }
    }

    node.on_viewer_detach(session_id).await;
}

fn handle_client_event(node: &Node, session_id: Uuid, text: &str) {
    match parse_client_event(text) {
        Some(event) if event == TOGGLE_EVENT => {
            let node = node.clone();
            // Off the streaming path; the controller logs the outcome.
            tokio::spawn(async move {
                node.on_toggle_command().await.ok();
            });
        }
        Some(event) => tracing::debug!(session = %session_id, event = %event, "ignoring client event"),
        None => tracing::debug!(session = %session_id, "ignoring malformed client message"),
    }
}

fn parse_client_event(text: &str) -> Option<String> {
    serde_json::from_str::<ClientEvent>(text)
        .ok()
        .map(|event| event.event)
}

fn frame_event(frame: &FrameMessage) -> String {
    json!({
        "event": FRAME_EVENT,
        "int_temp": frame.internal_temp,
        "ext_temp": frame.external_temp,
        "image": STANDARD.encode(&frame.image),
    })
    .to_string()
}

fn error_event(message: &str) -> String {
    json!({ "event": ERROR_EVENT, "message": message }).to_string()
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/status", get(get_status))
        .route("/v1/actuator/toggle", post(post_toggle))
        .route("/ws", get(viewer_socket))
        .with_state(state)
}
