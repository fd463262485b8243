// Full session flow over real HTTP, WebSocket and file storage

use std::time::Duration;

use client::guard::{Decision, Redirect};
use client::realtime::protocol::NOTIFICATIONS_TOPIC;
use client::realtime::ChannelState;
use client::storage::{FileStore, KeyValueStore, TOKEN_KEY};
use client::{build_context, ClientConfig, ClientError, ReconnectPolicy, SessionBootstrapper};
use client_test_support::tokens::mint_numeric_token;
use serde_json::json;
use tempfile::TempDir;

use crate::support::api_server::ApiServer;
use crate::support::push_server::PushServer;

struct Env {
    api: ApiServer,
    push: PushServer,
    dir: TempDir,
    token: String,
}

impl Env {
    async fn start() -> Self {
        let token = mint_numeric_token(42, "ada");
        let issued = token.clone();
        let api = ApiServer::start(move |req| match req.path.as_str() {
            "/api/auth/login" => (
                200,
                json!({"token": issued, "user": {"id": 42, "username": "ada"}}),
            ),
            "/api/boards/1"
                if req.header("authorization") == Some(format!("Bearer {issued}").as_str()) =>
            {
                (200, json!({"id": 1, "title": "Autumn"}))
            }
            _ => (401, json!({"message": "token expired"})),
        })
        .await;
        let push = PushServer::start(None).await;
        Self {
            api,
            push,
            dir: TempDir::new().unwrap(),
            token,
        }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.api.base_url(),
            ws_url: self.push.url(),
            storage_path: self.dir.path().join("session.json"),
            handshake_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            reconnect: ReconnectPolicy::no_retry(),
        }
    }

    /// A fresh process: new context over the same storage file.
    fn client(&self) -> SessionBootstrapper {
        SessionBootstrapper::new(build_context().with_config(self.config()).build().unwrap())
    }
}

#[tokio::test]
async fn login_persists_and_a_restart_reconnects() {
    let env = Env::start().await;

    let first = env.client();
    assert_eq!(first.start().await, ChannelState::Disconnected);
    assert!(env.push.hellos().is_empty());

    let credential = first.login("ada", "s3cret").await.unwrap();
    assert_eq!(credential.token.as_deref(), Some(env.token.as_str()));
    assert_eq!(credential.subject_id().as_deref(), Some("42"));
    assert_eq!(first.context().channel.state(), ChannelState::Connected);
    assert_eq!(env.push.subscriptions(), vec![NOTIFICATIONS_TOPIC.to_string()]);
    first.context().channel.close();

    let second = env.client();
    assert_eq!(second.start().await, ChannelState::Connected);
    assert_eq!(env.push.hellos(), vec![env.token.clone(), env.token.clone()]);

    let restored = second.context().credentials.snapshot();
    assert_eq!(
        restored.user.and_then(|u| u.username).as_deref(),
        Some("ada")
    );
    second.context().channel.close();
}

#[tokio::test]
async fn guard_follows_the_session() {
    let env = Env::start().await;
    let client = env.client();
    client.start().await;
    let guard = &client.context().guard;

    let anonymous = client.context().credentials.snapshot();
    assert_eq!(
        guard.check("/board/3/edit", &anonymous),
        Decision::Redirect(Redirect::to("/signup").with_query("redirect", "/board/3/edit"))
    );
    assert_eq!(guard.check("/board/3", &anonymous), Decision::Allow);

    client.login("ada", "s3cret").await.unwrap();
    let signed_in = client.context().credentials.snapshot();
    assert_eq!(guard.check("/board/3/edit", &signed_in), Decision::Allow);
    assert_eq!(
        guard.check("/login", &signed_in),
        Decision::Redirect(Redirect::to("/explore"))
    );
    client.context().channel.close();
}

#[tokio::test]
async fn fetch_uses_the_session_token() {
    let env = Env::start().await;
    let client = env.client();
    client.start().await;
    client.login("ada", "s3cret").await.unwrap();

    let board = client.fetch("/boards/1").await.unwrap();

    assert_eq!(board["title"], "Autumn");
    assert!(client.context().credentials.token().is_some());
    client.context().channel.close();
}

#[tokio::test]
async fn unauthorized_fetch_ends_the_session() {
    let env = Env::start().await;
    let client = env.client();
    client.start().await;
    client.login("ada", "s3cret").await.unwrap();
    assert_eq!(client.context().channel.state(), ChannelState::Connected);

    let err = client.fetch("/boards/2").await.unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized));
    assert!(client.context().credentials.token().is_none());
    assert_eq!(client.context().channel.state(), ChannelState::Disconnected);

    let persisted = FileStore::new(env.dir.path().join("session.json"));
    assert_eq!(persisted.get(TOKEN_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn fetch_without_a_session_is_unauthorized() {
    let env = Env::start().await;
    let client = env.client();
    client.start().await;

    let err = client.fetch("/boards/1").await.unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized));
    assert!(env.api.requests().is_empty());
}

#[tokio::test]
async fn logout_erases_the_persisted_session() {
    let env = Env::start().await;
    let client = env.client();
    client.start().await;
    client.login("ada", "s3cret").await.unwrap();

    client.logout().await;

    assert_eq!(client.context().channel.state(), ChannelState::Disconnected);
    let restarted = env.client();
    assert_eq!(restarted.start().await, ChannelState::Disconnected);
    assert_eq!(env.push.hellos().len(), 1);
}
