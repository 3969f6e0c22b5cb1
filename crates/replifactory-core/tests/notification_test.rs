#![allow(clippy::unwrap_used)]
// NotificationChannel against a local WebSocket server.

use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use replifactory_core::{
    ChannelState, Controller, CoreError, GatewayConfig, NotificationKind,
};

const WAIT: Duration = Duration::from_secs(5);

/// Serve one WebSocket session: send `frames`, then close once `hold`
/// resolves (immediately when `hold` is `None`).
async fn serve(frames: Vec<&'static str>, hold: Option<oneshot::Receiver<()>>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        let _ = ws.close(None).await;
    });
    Url::parse(&format!("http://{addr}/api")).unwrap()
}

fn controller(url: Url, capacity: usize) -> Controller {
    let mut config = GatewayConfig::new(url);
    config.notification_capacity = capacity;
    Controller::new(config).unwrap()
}

async fn wait_for_disconnect(controller: &Controller) {
    let mut changes = controller.notifications().state_changes();
    tokio::time::timeout(WAIT, changes.wait_for(|s| *s == ChannelState::Disconnected))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_frames_land_in_logs() {
    let url = serve(
        vec![
            r#"{"type":"progress","message":"step 1"}"#,
            "not json",
            r#"{"type":"success","message":"Pump calibrated"}"#,
            r#"{"message":"Valve opened"}"#,
        ],
        None,
    )
    .await;
    let controller = controller(url, 500);
    let channel = controller.notifications();
    let mut toasts = channel.subscribe_toasts();

    channel.connect().await.unwrap();
    wait_for_disconnect(&controller).await;

    assert_eq!(channel.progress_messages(), vec!["step 1".to_owned()]);

    let kinds: Vec<(NotificationKind, String)> = channel
        .notifications()
        .into_iter()
        .map(|n| (n.kind, n.message))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (NotificationKind::Success, "Pump calibrated".to_owned()),
            (NotificationKind::Info, "Valve opened".to_owned()),
        ]
    );

    let first = toasts.recv().await.unwrap();
    assert_eq!(first.message, "Pump calibrated");

    channel.clear_progress();
    assert!(channel.progress_messages().is_empty());
}

#[tokio::test]
async fn test_progress_log_is_bounded() {
    let url = serve(
        vec![
            r#"{"type":"progress","message":"a"}"#,
            r#"{"type":"progress","message":"b"}"#,
            r#"{"type":"progress","message":"c"}"#,
        ],
        None,
    )
    .await;
    let controller = controller(url, 2);

    controller.notifications().connect().await.unwrap();
    wait_for_disconnect(&controller).await;

    assert_eq!(
        controller.notifications().progress_messages(),
        vec!["b".to_owned(), "c".to_owned()]
    );
}

#[tokio::test]
async fn test_connect_while_connected_is_noop() {
    let (release, hold) = oneshot::channel();
    let url = serve(vec![], Some(hold)).await;
    let controller = controller(url, 500);
    let channel = controller.notifications();

    channel.connect().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);

    // A second handshake would hang: the server only accepts once
    tokio::time::timeout(WAIT, channel.connect())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);

    channel.disconnect();
    assert_eq!(channel.state(), ChannelState::Disconnected);
    let _ = release.send(());
}

#[tokio::test]
async fn test_failed_handshake_returns_to_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/api")).unwrap();
    let controller = controller(url, 500);
    let channel = controller.notifications();

    let err = channel.connect().await.unwrap_err();
    assert!(matches!(err, CoreError::Channel { .. }));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_shutdown_ends_session() {
    let (_release, hold) = oneshot::channel::<()>();
    let url = serve(vec![], Some(hold)).await;
    let controller = controller(url, 500);

    controller.notifications().connect().await.unwrap();
    controller.shutdown();
    wait_for_disconnect(&controller).await;
}
