// End-to-end channel tests against the scripted push server

use std::sync::Arc;
use std::time::Duration;

use client::realtime::protocol::{LIKE_COMMAND, NOTIFICATIONS_TOPIC};
use client::realtime::{ChannelConfig, ChannelState, NotificationChannel, WsTransport};
use client::ClientError;
use client_test_support::tokens::{mint_expired_token, mint_test_token};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::support::push_server::PushServer;
use crate::support::wait_for;

fn channel_for(url: String) -> NotificationChannel {
    let mut config = ChannelConfig::new(url);
    config.handshake_timeout = Duration::from_secs(2);
    config.request_timeout = Duration::from_secs(2);
    NotificationChannel::new(Arc::new(WsTransport), config)
}

fn collector() -> (Arc<Mutex<Vec<Value>>>, impl Fn(Value) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |value| sink.lock().push(value))
}

#[tokio::test]
async fn handshake_presents_the_token_and_reports_the_user() {
    let server = PushServer::start(None).await;
    let channel = channel_for(server.url());
    let token = mint_test_token("42");

    channel.open(&token).await.unwrap();

    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(channel.user_id().as_deref(), Some("42"));
    assert_eq!(server.hellos(), vec![token]);
    channel.close();
}

#[tokio::test]
async fn published_events_arrive_in_order() {
    let server = PushServer::start(None).await;
    let channel = channel_for(server.url());
    channel.open(&mint_test_token("42")).await.unwrap();

    let (seen, on_event) = collector();
    channel.subscribe(NOTIFICATIONS_TOPIC, on_event).await.unwrap();
    assert_eq!(server.subscriptions(), vec![NOTIFICATIONS_TOPIC.to_string()]);

    for n in 0..5 {
        server.publish(NOTIFICATIONS_TOPIC, json!({ "n": n }));
    }
    // A topic nobody subscribed to is dropped.
    server.publish("boards", json!({ "n": 99 }));

    let observed = seen.clone();
    assert!(wait_for(Duration::from_secs(2), || {
        let observed = observed.clone();
        async move { observed.lock().len() == 5 }
    })
    .await);
    let order: Vec<i64> = seen.lock().iter().filter_map(|v| v["n"].as_i64()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
    channel.close();
}

#[tokio::test]
async fn like_command_runs_the_registered_handler() {
    let server = PushServer::start(None).await;
    let channel = channel_for(server.url());
    channel.open(&mint_test_token("42")).await.unwrap();

    let (first, stale) = collector();
    let (second, current) = collector();
    channel.on_command(LIKE_COMMAND, stale).unwrap();
    channel.on_command(LIKE_COMMAND, current).unwrap();
    // Subscribing first makes sure the server has seen the session live.
    channel.subscribe(NOTIFICATIONS_TOPIC, |_| {}).await.unwrap();

    server.command(LIKE_COMMAND, json!({"board_id": 9}));

    let observed = second.clone();
    assert!(wait_for(Duration::from_secs(2), || {
        let observed = observed.clone();
        async move { !observed.lock().is_empty() }
    })
    .await);
    assert_eq!(*second.lock(), vec![json!({"board_id": 9})]);
    assert!(first.lock().is_empty());
    channel.close();
}

#[tokio::test]
async fn expired_token_fails_the_open() {
    let token = mint_expired_token("42");
    let server = PushServer::start(Some(&token)).await;
    let channel = channel_for(server.url());

    let err = channel.open(&token).await.unwrap_err();

    assert!(matches!(err, ClientError::ChannelAuthRejected { .. }), "{err:?}");
    assert_eq!(channel.state(), ChannelState::Failed);
}

#[tokio::test]
async fn nothing_listening_is_unreachable() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let channel = channel_for(format!("ws://{addr}/ws"));

    let err = channel.open("a.b.c").await.unwrap_err();

    assert!(err.is_transient(), "{err:?}");
    assert_eq!(channel.state(), ChannelState::Failed);
}

#[tokio::test]
async fn server_dropping_the_connection_fails_the_channel() {
    let server = PushServer::start(None).await;
    let channel = channel_for(server.url());
    channel.open(&mint_test_token("42")).await.unwrap();
    channel.subscribe(NOTIFICATIONS_TOPIC, |_| {}).await.unwrap();

    server.kick_all();

    let observed = channel.clone();
    assert!(wait_for(Duration::from_secs(2), || {
        let observed = observed.clone();
        async move { observed.state() == ChannelState::Failed }
    })
    .await);
    assert!(matches!(
        channel.subscribe(NOTIFICATIONS_TOPIC, |_| {}).await,
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn unsubscribe_reaches_the_server() {
    let server = PushServer::start(None).await;
    let channel = channel_for(server.url());
    channel.open(&mint_test_token("42")).await.unwrap();
    channel.subscribe(NOTIFICATIONS_TOPIC, |_| {}).await.unwrap();

    channel.unsubscribe(NOTIFICATIONS_TOPIC).unwrap();

    let server = &server;
    let unsubscribed =
        move || async move { server.unsubscriptions() == vec![NOTIFICATIONS_TOPIC.to_string()] };
    assert!(wait_for(Duration::from_secs(2), unsubscribed).await);
    channel.close();
}
