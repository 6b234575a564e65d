//! Feed Lifecycle Integration Tests
//!
//! Mounts real feeds against a local tokio-tungstenite server and checks
//! reconciliation, buffering, reconnection and teardown end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use dashboard_sync::infrastructure::websocket::CloseKind;
use dashboard_sync::{
    ConnectionState, DashboardFeed, ErrorCode, FeedConfig, FeedView, Filters, ReconnectConfig,
};

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Accepts every incoming socket and hands it to the test.
async fn start_server() -> (String, mpsc::UnboundedReceiver<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await
                && tx.send(ws).is_err()
            {
                break;
            }
        }
    });

    (format!("ws://{addr}"), rx)
}

async fn accept(rx: &mut mpsc::UnboundedReceiver<ServerSocket>) -> ServerSocket {
    timeout(WAIT, rx.recv())
        .await
        .expect("no connection within timeout")
        .expect("server stopped")
}

async fn wait_for<F>(feed: &DashboardFeed, predicate: F)
where
    F: FnMut(&FeedView) -> bool,
{
    let mut views = feed.subscribe();
    let result = timeout(WAIT, views.wait_for(predicate))
        .await
        .expect("view did not change within timeout");
    tokio_test::assert_ok!(result.map(|_| ()));
}

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig::default()
        .with_base_interval(Duration::from_millis(50))
        .with_max_attempts(5)
}

const INITIAL: &str = r#"{"type":"initial","data":{
    "timeSeries":[
        {"date":"2023-01-01","revenue":1000,"users":50,"conversion":2.5},
        {"date":"2023-01-02","revenue":1100,"users":55,"conversion":2.6}
    ],
    "barData":[{"name":"Producto A","revenue":4000},{"name":"Producto B","revenue":3000}],
    "heatmapData":[{"x":"00-04","y":"Producto A","value":12},{"x":"04-08","y":"Producto B","value":7}]
}}"#;

const UPDATE: &str = r#"{"type":"update","data":{"timeSeries":[
    {"date":"2023-01-03","revenue":1200,"users":60,"conversion":2.7}
]}}"#;

#[tokio::test]
async fn initial_then_update_is_reconciled() {
    let (url, mut server) = start_server().await;
    let feed = DashboardFeed::mount(FeedConfig::new(url));

    let mut socket = accept(&mut server).await;
    wait_for(&feed, |v| v.connected).await;

    socket.send(Message::Text(INITIAL.into())).await.unwrap();
    socket.send(Message::Text(UPDATE.into())).await.unwrap();
    wait_for(&feed, |v| {
        v.snapshot.as_ref().is_some_and(|s| s.time_series.len() == 3)
    })
    .await;

    let snapshot = feed.snapshot().unwrap();
    assert_eq!(snapshot.time_series[2].date, "2023-01-03");
    assert_eq!(snapshot.time_series[2].value("revenue"), Some(1200.0));
    assert_eq!(snapshot.bar_data.len(), 2);
    assert_eq!(snapshot.heatmap_data.len(), 2);

    let filtered = feed
        .filtered(&Filters::none().with_categories(["producto b"]))
        .unwrap();
    assert_eq!(filtered.bar_data.len(), 1);
    assert_eq!(filtered.heatmap_data.len(), 1);
    assert_eq!(filtered.time_series.len(), 3);

    feed.unmount().await;
}

#[tokio::test]
async fn malformed_frames_do_not_touch_the_snapshot() {
    let (url, mut server) = start_server().await;
    let feed = DashboardFeed::mount(FeedConfig::new(url));

    let mut socket = accept(&mut server).await;
    socket.send(Message::Text(INITIAL.into())).await.unwrap();
    wait_for(&feed, |v| v.snapshot.is_some()).await;

    socket
        .send(Message::Text(r#"{"type":"update","data":{"timeSeries":[{"revenue":1}]}}"#.into()))
        .await
        .unwrap();
    wait_for(&feed, |v| v.error.is_some()).await;

    assert!(feed.error().unwrap().contains("date"));
    assert_eq!(feed.snapshot().unwrap().time_series.len(), 2);
    assert!(feed.is_connected());

    feed.unmount().await;
}

#[tokio::test]
async fn message_sent_while_connecting_reaches_the_server() {
    let (url, mut server) = start_server().await;
    let feed = DashboardFeed::mount(FeedConfig::new(url));

    tokio_test::assert_ok!(feed.send(&serde_json::json!({"subscribe": "revenue"})));

    let mut socket = accept(&mut server).await;
    let received = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(received, Message::Text(r#"{"subscribe":"revenue"}"#.into()));

    feed.unmount().await;
}

#[tokio::test]
async fn server_ping_is_answered_once() {
    let (url, mut server) = start_server().await;
    let feed = DashboardFeed::mount(FeedConfig::new(url));

    let mut socket = accept(&mut server).await;
    wait_for(&feed, |v| v.connected).await;

    socket.send(Message::Ping("hb".into())).await.unwrap();
    let reply = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::Pong("hb".into()));
    assert!(
        timeout(Duration::from_millis(300), socket.next())
            .await
            .is_err(),
        "ping answered more than once"
    );
    assert!(feed.is_connected());

    feed.unmount().await;
}

#[tokio::test]
async fn abnormal_drop_reconnects() {
    let (url, mut server) = start_server().await;
    let feed = DashboardFeed::mount(FeedConfig::new(url).with_reconnect(fast_reconnect()));

    let socket = accept(&mut server).await;
    wait_for(&feed, |v| v.connected).await;
    drop(socket);

    let _second = accept(&mut server).await;
    wait_for(&feed, |v| v.connected && v.reconnect_attempt == 0).await;

    feed.unmount().await;
}

#[tokio::test]
async fn normal_close_from_server_is_final() {
    let (url, mut server) = start_server().await;
    let feed = DashboardFeed::mount(FeedConfig::new(url).with_reconnect(fast_reconnect()));

    let mut socket = accept(&mut server).await;
    wait_for(&feed, |v| v.connected).await;

    socket
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "maintenance".into(),
        }))
        .await
        .unwrap();
    wait_for(&feed, |v| v.state == ConnectionState::Closed(CloseKind::Normal)).await;

    assert!(
        timeout(Duration::from_millis(300), server.recv())
            .await
            .is_err(),
        "feed reconnected after a normal close"
    );
    feed.unmount().await;
}

#[tokio::test]
async fn unmount_closes_normally_and_stays_closed() {
    let (url, mut server) = start_server().await;
    let feed = DashboardFeed::mount(FeedConfig::new(url).with_reconnect(fast_reconnect()));

    let mut socket = accept(&mut server).await;
    wait_for(&feed, |v| v.connected).await;

    let views = feed.subscribe();
    feed.unmount().await;

    let frame = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
    let Message::Close(Some(close)) = frame else {
        panic!("expected a close frame, got {frame:?}");
    };
    assert_eq!(close.code, CloseCode::Normal);

    assert!(!views.borrow().connected);
    assert_eq!(
        views.borrow().state,
        ConnectionState::Closed(CloseKind::Manual)
    );
    assert!(
        timeout(Duration::from_millis(300), server.recv())
            .await
            .is_err(),
        "feed reconnected after unmount"
    );
}

#[tokio::test]
async fn unreachable_server_is_retried_until_exhausted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let reconnect = ReconnectConfig::default()
        .with_base_interval(Duration::from_millis(10))
        .with_max_attempts(2);
    let feed = DashboardFeed::mount(FeedConfig::new(url).with_reconnect(reconnect));

    wait_for(&feed, |v| {
        v.state == ConnectionState::Closed(CloseKind::Exhausted)
    })
    .await;
    assert_eq!(
        feed.error().as_deref(),
        Some("Failed to reconnect after 2 attempts")
    );

    feed.unmount().await;
}

#[tokio::test]
async fn invalid_endpoint_is_reported_without_connecting() {
    let feed = DashboardFeed::mount(FeedConfig::new("https://dashboard.example.com"));
    assert_eq!(feed.error().as_deref(), Some("Invalid WebSocket protocol"));
    assert!(!feed.is_connected());

    let err = tokio_test::assert_err!(feed.send_text("ping"));
    assert_eq!(err.code(), ErrorCode::WsNotConnected);

    feed.unmount().await;
}
