//! Stand-in for the REST API, served by actix-web on a random port.
//!
//! Every request is answered by a closure and recorded for assertions.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::web::{self, Bytes};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == &name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

type Responder = dyn Fn(&RecordedRequest) -> (u16, Value) + Send + Sync;

struct Recorder {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    respond: Arc<Responder>,
}

pub struct ApiServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: ServerHandle,
    join: JoinHandle<std::io::Result<()>>,
}

impl ApiServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorder = web::Data::new(Recorder {
            requests: requests.clone(),
            respond: Arc::new(respond),
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(recorder.clone())
                .default_service(web::to(record))
        })
        .workers(1)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        let join = tokio::spawn(server);

        Self {
            addr,
            requests,
            handle,
            join,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL including the `/api` prefix.
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        // The stop command is sent eagerly; nothing left to await here.
        drop(self.handle.stop(false));
        self.join.abort();
    }
}

async fn record(req: HttpRequest, body: Bytes, recorder: web::Data<Recorder>) -> HttpResponse {
    let request = RecordedRequest {
        method: req.method().to_string(),
        path: req.path().to_string(),
        headers: req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };

    let (status, payload) = (recorder.respond)(&request);
    recorder.requests.lock().push(request);

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(payload)
}
