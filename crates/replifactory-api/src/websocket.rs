//! Backend notification socket.
//!
//! The backend pushes JSON text frames on `/ws`; the client never writes.
//! Two shapes are recognized:
//!
//! - `{"type": "progress", "message": "..."}`: a step of a long-running
//!   operation.
//! - `{"type": "success" | "info" | ..., "message": "..."}`: a toast.
//!
//! Anything else is logged at `debug` and dropped. There is no
//! reconnect loop here: when [`NotificationSocket::run`] returns, the
//! caller decides whether to open a new socket.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Frame types ──────────────────────────────────────────────────────

/// Severity tag carried by a notification frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Info,
    Progress,
    #[serde(other)]
    Other,
}

/// A parsed notification frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Progress { message: String },
    Toast { kind: NotificationKind, message: String },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<NotificationKind>,
    message: String,
}

/// Parse one text frame. Returns `None` for anything unrecognized.
pub fn parse_frame(text: &str) -> Option<Frame> {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed notification frame");
            return None;
        }
    };

    Some(match raw.kind.unwrap_or(NotificationKind::Info) {
        NotificationKind::Progress => Frame::Progress {
            message: raw.message,
        },
        kind => Frame::Toast {
            kind,
            message: raw.message,
        },
    })
}

/// Derive the socket URL from the HTTP gateway base: `http` → `ws`,
/// `https` → `wss`, then `{base}/ws`.
pub fn ws_url(base: &Url) -> Result<Url, Error> {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot derive ws URL from {base}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url.join("ws")?)
}

// ── NotificationSocket ───────────────────────────────────────────────

/// An open notification socket.
pub struct NotificationSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl NotificationSocket {
    /// Perform the WebSocket handshake.
    pub async fn open(url: &Url) -> Result<Self, Error> {
        tracing::info!(url = %url, "Connecting to notification socket");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let (stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("Notification socket connected");
        Ok(Self { stream })
    }

    /// Read frames until the server closes, the stream errors, or `cancel`
    /// fires. Each recognized frame is handed to `on_frame`.
    ///
    /// A clean close or cancellation returns `Ok(())`.
    pub async fn run(
        self,
        cancel: &CancellationToken,
        mut on_frame: impl FnMut(Frame) + Send,
    ) -> Result<(), Error> {
        let (_write, mut read) = self.stream.split();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                frame = read.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            if let Some(parsed) = parse_frame(&text) {
                                on_frame(parsed);
                            }
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tungstenite queues the pong reply itself
                            tracing::trace!("Notification socket ping");
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                tracing::info!(
                                    code = %cf.code,
                                    reason = %cf.reason,
                                    "Notification socket closed by server"
                                );
                            } else {
                                tracing::info!("Notification socket closed by server (no payload)");
                            }
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            return Err(Error::WebSocketClosed {
                                code: 1006,
                                reason: e.to_string(),
                            });
                        }
                        None => {
                            tracing::info!("Notification stream ended");
                            return Ok(());
                        }
                        _ => {
                            // Binary, Pong, Frame
                        }
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
