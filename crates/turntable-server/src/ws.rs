use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use turntable_core::protocol::ClientCommand;

use crate::broker::SEND_QUEUE_DEPTH;
use crate::policy;
use crate::AppContext;

/// Close code for sockets that present no valid session.
pub const CLOSE_UNAUTHENTICATED: u16 = 4001;

const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

const SESSION_PARAM: &str = "sessionID";

/// Session id from the query string, falling back to the cookie the
/// browser client carries from session creation.
fn extract_session_id(params: &HashMap<String, String>, headers: &HeaderMap) -> Option<String> {
    if let Some(id) = params.get(SESSION_PARAM) {
        if !id.is_empty() {
            return Some(id.clone());
        }
    }
    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        if parts.next() == Some(SESSION_PARAM) {
            return parts.next().map(str::to_string);
        }
    }
    None
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(ctx): State<Arc<AppContext>>,
) -> impl IntoResponse {
    let session_id = extract_session_id(&params, &headers);
    ws.on_upgrade(move |socket| async move {
        handle_socket(ctx, socket, session_id).await;
    })
}

async fn handle_socket(ctx: Arc<AppContext>, socket: WebSocket, session_id: Option<String>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // resolve the session before spending a writer task on the socket
    let session = session_id.and_then(|id| ctx.registry.get(&id));
    let Some(session) = session else {
        warn!(event = "ws_unauthenticated");
        let _ = ws_sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_UNAUTHENTICATED,
                reason: "unauthenticated".into(),
            })))
            .await;
        return;
    };

    let (tx, mut rx) = mpsc::channel::<Message>(SEND_QUEUE_DEPTH);
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let send = ws_sender.send(msg);
            if tokio::time::timeout(WRITE_TIMEOUT, send).await.is_err() {
                return;
            }
        }
    });

    // registration goes through the store so the pushed snapshot and
    // the socket's membership are atomic with respect to state updates
    let handle = if session.is_host {
        ctx.store.register_host(&session.id, tx)
    } else {
        ctx.store.register_side(&session.id, tx)
    };
    info!(event = "ws_open", conn_id = %handle.conn_id, is_host = session.is_host);

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                debug!(event = "ws_read_error", conn_id = %handle.conn_id, error = %err);
                break;
            }
        };
        match msg {
            Message::Text(text) => match ClientCommand::parse(&text) {
                Ok(command) => policy::handle_command(&ctx, &session.id, command),
                Err(err) => {
                    warn!(event = "bad_frame", conn_id = %handle.conn_id, error = %err);
                }
            },
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                warn!(event = "binary_frame_ignored", conn_id = %handle.conn_id);
            }
            Message::Close(_) => break,
        }
    }

    ctx.broker.unregister(&handle);
    write_task.abort();
    info!(event = "ws_closed", conn_id = %handle.conn_id);
}
