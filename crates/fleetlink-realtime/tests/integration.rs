//! End-to-end tests: a stub portal backend pushes frames over a real
//! WebSocket and the subsystem turns them into UI-visible alerts.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use fleetlink_core::{Anonymous, ChannelConfig, Envelope, MessageType, NotifyConfig};
use fleetlink_notify::NotificationKind;
use fleetlink_realtime::Realtime;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn realtime(port: u16) -> Realtime {
    let config = ChannelConfig {
        endpoint: format!("ws://127.0.0.1:{port}/live"),
        reconnect_delay: Duration::from_millis(25),
        max_reconnect_attempts: 5,
        ..Default::default()
    };
    Realtime::new(config, NotifyConfig::default(), Arc::new(Anonymous))
}

/// Poll until at least one alert is visible, or time out.
async fn wait_for_alert(realtime: &Realtime) {
    timeout(TIMEOUT, async {
        while realtime.notifications().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn e2e_pushed_notification_becomes_visible_alert() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"notification","category":"warning","title":"Parcels",
                "message":"Parcel p_9 missed its transfer","timestamp":1722945600000}"#
                .into(),
        ))
        .await
        .unwrap();
        let _ = timeout(TIMEOUT, ws.next()).await;
    });

    let realtime = realtime(port);
    let mut changes = realtime.notifications().changes();

    timeout(TIMEOUT, realtime.connect()).await.unwrap().unwrap();
    timeout(TIMEOUT, changes.changed()).await.unwrap().unwrap();

    let snapshot = realtime.notifications().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].kind, NotificationKind::Warning);
    assert_eq!(snapshot[0].title.as_deref(), Some("Parcels"));
    assert!(snapshot[0].auto_close);

    realtime.shutdown().await;
    let _ = server.await;
}

#[tokio::test]
async fn e2e_persistent_loss_surfaces_single_sticky_alert() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
        drop(listener);
    });

    let realtime = realtime(port);
    timeout(TIMEOUT, realtime.connect()).await.unwrap().unwrap();
    let _ = server.await;

    // Five failed retries, then the one Lost alert.
    wait_for_alert(&realtime).await;

    let snapshot = realtime.notifications().snapshot();
    assert_eq!(snapshot.len(), 1, "one alert total, not one per attempt");
    assert_eq!(snapshot[0].kind, NotificationKind::Error);
    assert!(!snapshot[0].auto_close, "loss alert must be sticky");

    // Dismissal works and is idempotent.
    let id = snapshot[0].id.clone();
    realtime.dismiss(&id);
    realtime.dismiss(&id);
    assert!(realtime.notifications().is_empty());
}

#[tokio::test]
async fn e2e_send_before_connect_reaches_backend_in_order() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut seen = Vec::new();
        while seen.len() < 2 {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    seen.push(value["message"].as_str().unwrap().to_string());
                }
                Some(Ok(_)) => {}
                _ => break,
            }
        }
        seen
    });

    let realtime = realtime(port);
    realtime.send(Envelope::new(MessageType::Update, "ticket", "seat held"));
    realtime.send(Envelope::new(MessageType::Update, "ticket", "seat confirmed"));

    timeout(TIMEOUT, realtime.connect()).await.unwrap().unwrap();

    let seen = timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(seen, vec!["seat held", "seat confirmed"]);

    realtime.shutdown().await;
}

#[tokio::test]
async fn e2e_category_subscription_sees_only_its_category() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in [
            r#"{"type":"update","category":"trip","message":"departed"}"#,
            r#"{"type":"update","category":"parcel","message":"scanned"}"#,
        ] {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        let _ = timeout(TIMEOUT, ws.next()).await;
    });

    let realtime = realtime(port);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = realtime.subscribe_category(MessageType::Update, "parcel", move |env| {
        sink.lock().push(env.message.clone());
    });

    timeout(TIMEOUT, realtime.connect()).await.unwrap().unwrap();

    timeout(TIMEOUT, async {
        while seen.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(*seen.lock(), vec!["scanned"]);

    realtime.shutdown().await;
    let _ = server.await;
}
