//! WebSocket proxy: forwards frames verbatim between a client and the
//! upstream Chrome DevTools Protocol endpoint for one leased session.
//!
//! Grounded on the original gateway's `handle_websocket`/`forward_messages`
//! pair: connect outbound to the CDP url, pump both directions concurrently,
//! and close out the session's lease once either side disconnects.

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, warn};

use crate::browser_pool::BrowserPool;
use crate::error::GatewayError;
use crate::probe;

/// Close code used when the upstream instance never advertised a debugger
/// url, matching the sentinel the original gateway closed with.
const NO_DEBUGGER_URL_CLOSE_CODE: u16 = 4004;

/// Drive one client WebSocket connection for `session_id` end to end:
/// validate, probe, proxy, and finally refresh the session's idle lease.
pub async fn serve(mut socket: WebSocket, session_id: String, pool: BrowserPool) {
    if !pool.validate_session(&session_id).await {
        close_with(&mut socket, 4001, "unknown or expired session").await;
        return;
    }

    let Some(port) = pool.port_for_session(&session_id).await else {
        close_with(&mut socket, 4001, "unknown or expired session").await;
        return;
    };

    let debugger_url = match probe::fetch_debugger_url(port, pool.connection_timeout()).await {
        Ok(url) => url,
        Err(GatewayError::NoDebuggerUrl) => {
            close_with(
                &mut socket,
                NO_DEBUGGER_URL_CLOSE_CODE,
                "webSocketDebuggerUrl not found",
            )
            .await;
            return;
        }
        Err(err) => {
            warn!(session_id, error = %err, "upstream probe failed");
            close_with(&mut socket, 1011, "upstream unreachable").await;
            return;
        }
    };

    let connect = tokio::time::timeout(
        pool.connection_timeout(),
        tokio_tungstenite::connect_async(&debugger_url),
    )
    .await;

    let upstream = match connect {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(err)) => {
            warn!(session_id, error = %err, "failed to connect to upstream debugger url");
            close_with(&mut socket, 1011, "upstream connection failed").await;
            return;
        }
        Err(_) => {
            warn!(session_id, "timed out connecting to upstream debugger url");
            close_with(&mut socket, 1011, "upstream connection timed out").await;
            return;
        }
    };

    debug!(session_id, port, "proxying websocket session");
    let (mut upstream_tx, mut upstream_rx) = upstream.split();
    let (mut client_tx, mut client_rx) = socket.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let forwarded = match msg {
                ClientMessage::Text(t) => Some(UpstreamMessage::Text(t)),
                ClientMessage::Binary(b) => Some(UpstreamMessage::Binary(b)),
                ClientMessage::Ping(p) => Some(UpstreamMessage::Ping(p)),
                ClientMessage::Pong(p) => Some(UpstreamMessage::Pong(p)),
                ClientMessage::Close(_) => None,
            };
            match forwarded {
                Some(frame) => {
                    if upstream_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let forwarded = match msg {
                UpstreamMessage::Text(t) => Some(ClientMessage::Text(t)),
                UpstreamMessage::Binary(b) => Some(ClientMessage::Binary(b)),
                UpstreamMessage::Ping(p) => Some(ClientMessage::Ping(p)),
                UpstreamMessage::Pong(p) => Some(ClientMessage::Pong(p)),
                UpstreamMessage::Close(_) | UpstreamMessage::Frame(_) => None,
            };
            match forwarded {
                Some(frame) => {
                    if client_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }

    pool.refresh_lease(&session_id).await;
    debug!(session_id, "websocket session ended, lease refreshed");
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(ClientMessage::Close(Some(axum::extract::ws::CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}
