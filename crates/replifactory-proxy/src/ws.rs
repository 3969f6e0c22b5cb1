//! WebSocket bridge from `{prefix}/ws` to the backend notification socket.

use axum::extract::State;
use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode};
use tracing::{debug, warn};
use url::Url;

use crate::AppState;

pub async fn bridge(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let upstream = state.backend_ws.clone();
    ws.on_upgrade(move |socket| relay(socket, upstream))
}

async fn relay(mut client: WebSocket, upstream: Url) {
    let backend = match tokio_tungstenite::connect_async(upstream.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(%upstream, error = %e, "backend websocket unavailable");
            let _ = client.send(ws::Message::Close(None)).await;
            return;
        }
    };
    debug!(%upstream, "websocket bridge open");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let upstream_leg = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let closing = matches!(msg, ws::Message::Close(_));
            if backend_tx.send(to_backend(msg)).await.is_err() || closing {
                break;
            }
        }
    };
    let downstream_leg = async {
        while let Some(Ok(msg)) = backend_rx.next().await {
            let Some(msg) = to_client(msg) else { continue };
            let closing = matches!(msg, ws::Message::Close(_));
            if client_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        () = upstream_leg => {}
        () = downstream_leg => {}
    }
    debug!(%upstream, "websocket bridge closed");
}

fn to_backend(msg: ws::Message) -> tungstenite::Message {
    match msg {
        ws::Message::Text(text) => tungstenite::Message::text(text.as_str()),
        ws::Message::Binary(data) => tungstenite::Message::Binary(data),
        ws::Message::Ping(data) => tungstenite::Message::Ping(data),
        ws::Message::Pong(data) => tungstenite::Message::Pong(data),
        ws::Message::Close(frame) => {
            tungstenite::Message::Close(frame.map(|f| tungstenite::protocol::CloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.as_str().into(),
            }))
        }
    }
}

fn to_client(msg: tungstenite::Message) -> Option<ws::Message> {
    Some(match msg {
        tungstenite::Message::Text(text) => ws::Message::Text(text.as_str().into()),
        tungstenite::Message::Binary(data) => ws::Message::Binary(data),
        tungstenite::Message::Ping(data) => ws::Message::Ping(data),
        tungstenite::Message::Pong(data) => ws::Message::Pong(data),
        tungstenite::Message::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().into(),
        })),
        tungstenite::Message::Frame(_) => return None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn text_and_close_survive_both_directions() {
        let out = to_backend(ws::Message::Text("hello".into()));
        assert_eq!(out.to_text().unwrap(), "hello");

        let back = to_client(tungstenite::Message::Close(Some(
            tungstenite::protocol::CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            },
        )))
        .unwrap();
        match back {
            ws::Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1000);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
