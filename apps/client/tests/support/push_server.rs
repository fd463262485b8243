//! Scripted WebSocket push server for end-to-end channel tests.
//!
//! Speaks the wire protocol with raw JSON values so the tests exercise the
//! client's serialization rather than sharing its types.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

#[derive(Default)]
struct Recorded {
    hellos: Vec<String>,
    subscriptions: Vec<String>,
    unsubscriptions: Vec<String>,
}

pub struct PushServer {
    addr: std::net::SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    frames: broadcast::Sender<Value>,
    kick: broadcast::Sender<()>,
    accept_loop: JoinHandle<()>,
}

impl PushServer {
    /// Start a server that accepts every token except `rejected`.
    pub async fn start(rejected: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let (frames, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let rejected = rejected.map(str::to_string);

        let accept_loop = {
            let recorded = recorded.clone();
            let frames = frames.clone();
            let kick = kick.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(
                        stream,
                        recorded.clone(),
                        frames.subscribe(),
                        kick.subscribe(),
                        rejected.clone(),
                    ));
                }
            })
        };

        Self {
            addr,
            recorded,
            frames,
            kick,
            accept_loop,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Tokens presented in `hello` frames, in arrival order.
    pub fn hellos(&self) -> Vec<String> {
        self.recorded.lock().hellos.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.recorded.lock().subscriptions.clone()
    }

    pub fn unsubscriptions(&self) -> Vec<String> {
        self.recorded.lock().unsubscriptions.clone()
    }

    /// Send `frame` to every authenticated connection.
    pub fn push(&self, frame: Value) {
        let _ = self.frames.send(frame);
    }

    pub fn publish(&self, topic: &str, data: Value) {
        self.push(json!({"type": "publish", "topic": topic, "data": data}));
    }

    pub fn command(&self, cmd: &str, payload: Value) {
        self.push(json!({"type": "cmd", "cmd": cmd, "payload": payload}));
    }

    /// Drop every open connection without a close frame.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }
}

impl Drop for PushServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) -> bool {
    ws.send(Message::Text(value.to_string().into())).await.is_ok()
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn serve(
    stream: TcpStream,
    recorded: Arc<Mutex<Recorded>>,
    mut frames: broadcast::Receiver<Value>,
    mut kick: broadcast::Receiver<()>,
    rejected: Option<String>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let Some(hello) = next_json(&mut ws).await else {
        return;
    };
    let token = hello["token"].as_str().unwrap_or_default().to_string();
    recorded.lock().hellos.push(token.clone());

    if hello["type"] != "hello" || rejected.as_deref() == Some(token.as_str()) {
        send_json(
            &mut ws,
            json!({"type": "error", "code": "unauthorized", "message": "invalid token"}),
        )
        .await;
        let _ = ws.close(None).await;
        return;
    }

    let protocol = hello["protocol"].clone();
    if !send_json(
        &mut ws,
        json!({"type": "hello_ack", "protocol": protocol, "user_id": "42"}),
    )
    .await
    {
        return;
    }

    loop {
        tokio::select! {
            _ = kick.recv() => return,
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if !send_json(&mut ws, frame).await {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            },
            inbound = next_json(&mut ws) => {
                let Some(msg) = inbound else {
                    return;
                };
                match msg["type"].as_str() {
                    Some("subscribe") => {
                        let topic = msg["topic"].as_str().unwrap_or_default().to_string();
                        recorded.lock().subscriptions.push(topic);
                        if !send_json(&mut ws, json!({"type": "ack", "id": msg["id"]})).await {
                            return;
                        }
                    }
                    Some("unsubscribe") => {
                        let topic = msg["topic"].as_str().unwrap_or_default().to_string();
                        recorded.lock().unsubscriptions.push(topic);
                    }
                    _ => {
                        let reply = json!({"type": "error", "code": "bad_request", "message": "unexpected frame"});
                        if !send_json(&mut ws, reply).await {
                            return;
                        }
                    }
                }
            }
        }
    }
}
