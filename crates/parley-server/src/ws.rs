//! WebSocket push channel.
//!
//! Each connection carries one identity (`?userId=`).  Server-to-client
//! frames are [`PushFrame`]s produced by the engine; the only
//! client-to-server frame is the `checkUserOnline` probe.  The socket task
//! owns the receiver half of the connection's push channel and pumps frames
//! onto the wire; when the socket closes for any reason the engine is told
//! to disconnect.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, error, info};

use parley_engine::ConnectionHandle;
use parley_shared::protocol::{PushFrame, EVENT_CHECK_USER_ONLINE};
use parley_shared::UserId;

use crate::api::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId")]
    user_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let Ok(user) = UserId::parse(&query.user_id) else {
        debug!(user_id = %query.user_id, "rejecting socket with malformed userId");
        return (StatusCode::BAD_REQUEST, "invalid userId").into_response();
    };

    match state.engine.is_authorized(user).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(%user, "rejecting socket for unknown identity");
            return (StatusCode::FORBIDDEN, "unknown identity").into_response();
        }
        Err(e) => {
            error!(%user, error = %e, "authorization check failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_push_channel(socket, user, state))
}

async fn handle_push_channel(mut socket: WebSocket, user: UserId, state: AppState) {
    let (handle, mut rx) = ConnectionHandle::new();

    state.engine.on_connect(user, handle.clone()).await;
    info!(%user, connection = %handle.id(), "push channel connected");

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // All senders gone: the registration was superseded and
                    // dropped, so this socket has nothing left to deliver.
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&state, &handle, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(%user, error = %e, "socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.engine.on_disconnect(user, &handle).await;
    info!(%user, connection = %handle.id(), "push channel closed");
}

async fn handle_client_frame(state: &AppState, handle: &ConnectionHandle, text: &str) {
    let Ok(frame) = serde_json::from_str::<PushFrame>(text) else {
        debug!("ignoring unparseable client frame");
        return;
    };

    if frame.event == EVENT_CHECK_USER_ONLINE {
        let target = frame
            .data
            .as_str()
            .and_then(|s| UserId::parse(s).ok());
        match target {
            Some(target) => state.engine.probe_online(handle, target).await,
            None => debug!("probe frame without a valid target id"),
        }
    } else {
        debug!(event = %frame.event, "ignoring unknown client event");
    }
}
