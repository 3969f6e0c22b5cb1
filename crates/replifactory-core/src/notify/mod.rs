// ── Realtime notification channel ──
//
// Receive-only view of the backend's `/ws` push socket. Frames land in
// two bounded logs (progress steps and toast notifications); toasts and
// progress lines are also broadcast for live consumers. Reconnection is
// manual: once the socket drops, the caller decides whether to
// `connect()` again.

mod log;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use replifactory_api::websocket::{Frame, NotificationSocket};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub use log::RingLog;

use crate::error::CoreError;
use crate::model::NotificationEvent;

const BROADCAST_CAPACITY: usize = 64;

// ── ChannelState ─────────────────────────────────────────────────────

/// Connection state of the notification socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

// ── NotificationChannel ──────────────────────────────────────────────

/// Cheaply cloneable handle to the notification channel.
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    url: Url,
    state: watch::Sender<ChannelState>,
    progress: watch::Sender<RingLog<String>>,
    notifications: watch::Sender<RingLog<NotificationEvent>>,
    toast_tx: broadcast::Sender<NotificationEvent>,
    progress_tx: broadcast::Sender<String>,
    /// Bumped per session so a finished reader cannot clobber a newer one.
    generation: AtomicU64,
    session: Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
}

impl NotificationChannel {
    /// A disconnected channel for the socket at `url`. Sessions are
    /// children of `cancel`.
    pub fn new(url: Url, capacity: usize, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (progress, _) = watch::channel(RingLog::with_capacity(capacity));
        let (notifications, _) = watch::channel(RingLog::with_capacity(capacity));
        let (toast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (progress_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(ChannelInner {
                url,
                state,
                progress,
                notifications,
                toast_tx,
                progress_tx,
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
                cancel,
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the socket and start reading in the background.
    ///
    /// A no-op while already connecting or connected. A failed handshake
    /// returns the channel to `Disconnected` and reports the error.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == ChannelState::Disconnected {
                *state = ChannelState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!("notification channel already active");
            return Ok(());
        }

        let socket = match NotificationSocket::open(&self.inner.url).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!(error = %e, "notification handshake failed");
                self.inner.state.send_replace(ChannelState::Disconnected);
                return Err(e.into());
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let session = self.inner.cancel.child_token();
        *self.inner.lock_session() = Some(session.clone());

        // disconnect() may have run during the handshake
        let promoted = self.inner.state.send_if_modified(|state| {
            if *state == ChannelState::Connecting {
                *state = ChannelState::Connected;
                true
            } else {
                false
            }
        });
        if !promoted {
            debug!("notification channel disconnected during handshake");
            session.cancel();
            return Ok(());
        }
        info!(url = %self.inner.url, "notification channel connected");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = socket
                .run(&session, |frame| inner.handle_frame(frame))
                .await;
            if let Err(e) = result {
                warn!(error = %e, "notification socket dropped");
            }
            inner.finish(generation);
        });
        Ok(())
    }

    /// Close the socket, if open. Always leaves the channel `Disconnected`.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(session) = self.inner.lock_session().take() {
            session.cancel();
        }
        if self.inner.state.send_replace(ChannelState::Disconnected) != ChannelState::Disconnected {
            info!("notification channel disconnected");
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// Progress steps, oldest first.
    pub fn progress_messages(&self) -> Vec<String> {
        self.inner.progress.borrow().to_vec()
    }

    /// Toast notifications, oldest first.
    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.inner.notifications.borrow().to_vec()
    }

    pub fn clear_progress(&self) {
        self.inner.progress.send_modify(RingLog::clear);
    }

    pub fn subscribe_toasts(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.toast_tx.subscribe()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<String> {
        self.inner.progress_tx.subscribe()
    }
}

impl ChannelInner {
    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Progress { message } => {
                debug!(%message, "progress");
                self.progress.send_modify(|log| log.push(message.clone()));
                // No live subscribers is fine
                let _ = self.progress_tx.send(message);
            }
            Frame::Toast { kind, message } => {
                let event = NotificationEvent::new(kind, message);
                debug!(kind = ?event.kind, message = %event.message, "notification");
                self.notifications
                    .send_modify(|log| log.push(event.clone()));
                let _ = self.toast_tx.send(event);
            }
        }
    }

    /// Reader task ended. Only the latest session may reset the state.
    fn finish(&self, generation: u64) {
        if self.generation.load(Ordering::Acquire) == generation {
            self.lock_session().take();
            self.state.send_replace(ChannelState::Disconnected);
            info!("notification channel closed");
        }
    }
}
