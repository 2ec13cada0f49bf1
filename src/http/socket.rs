//! WebSocket adapter between a media stream connection and a `CallSession`
//!
//! Reading and writing run on separate tasks. The reader feeds text frames
//! to the session; the writer drains the session's `ChannelTransport`, so
//! the pacer never waits on inbound processing and vice versa.

use super::state::AppState;
use crate::media::{ChannelTransport, Outbound};
use crate::session::{CallSession, Dispatch};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Frames buffered between the session and the socket writer
const OUTBOUND_QUEUE: usize = 64;

/// How long teardown waits for the writer to flush the close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /stream
/// Upgrade to a WebSocket carrying one media stream
pub async fn stream_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("Media stream upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    serve_connection(stream, sink, state).await;
}

/// Run one connection until the peer closes, errors, or sends "stop"
pub async fn serve_connection<S, E, K>(mut inbound: S, mut outbound: K, state: AppState)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    K: Sink<Message> + Unpin + Send + 'static,
    K::Error: Display + Send,
{
    let (transport, mut rx) = ChannelTransport::new(OUTBOUND_QUEUE);

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if let Err(e) = outbound.send(Message::Text(text)).await {
                        warn!("Socket write failed: {}", e);
                        break;
                    }
                }
                Outbound::Close => {
                    if let Err(e) = outbound.send(Message::Close(None)).await {
                        warn!("Failed to send close frame: {}", e);
                    }
                    break;
                }
            }
        }
    });

    let session = Arc::new(Mutex::new(CallSession::new(
        Uuid::new_v4(),
        Arc::clone(&state.session_config),
        Arc::new(transport),
    )));
    let connection_id = state.register(Arc::clone(&session)).await;

    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Dropping non-UTF-8 binary frame on {}", connection_id);
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                info!("WebSocket closed by peer on {}: {:?}", connection_id, frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
        };

        if session.lock().await.handle_text(&text).await == Dispatch::Close {
            break;
        }
    }

    {
        let mut session = session.lock().await;
        session.close().await;
        if let Some(outcome) = session.wait_for_pacer().await {
            info!("Pacer on {} ended: {:?}", connection_id, outcome);
        }
    }

    state.unregister(connection_id).await;

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Socket writer task failed: {}", e),
        Err(_) => {
            warn!("Peer on {} stopped reading; dropping unsent frames", connection_id);
            writer.abort();
        }
    }
}
