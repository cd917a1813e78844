#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

pub const PIECE_DELAY: Duration = Duration::from_millis(20);
pub const SLOW_DELAY: Duration = Duration::from_millis(300);

#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<Value>>>);

impl Recorded {
    pub fn bodies(&self) -> Vec<Value> { self.0.lock().unwrap().clone() }
}

/// In-process stand-in for a llama.cpp `/completion` endpoint.
///
/// Behaviour is keyed on words in the prompt so one server covers every case.
pub struct MockServer {
    pub base: String,
    pub recorded: Recorded,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) { self.task.abort(); }
}

pub async fn spawn_server() -> MockServer {
    let recorded = Recorded::default();
    let app = Router::new().route("/completion", post(completion)).with_state(recorded.clone());
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
    MockServer { base: format!("http://{}:{}", addr.ip(), addr.port()), recorded, task }
}

/// Base URL with nothing listening behind it.
pub async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}:{}", addr.ip(), addr.port())
}

async fn completion(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Response {
    recorded.0.lock().unwrap().push(body.clone());
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    let stream = body["stream"].as_bool().unwrap_or(false);

    if prompt.contains("fail") || (prompt.contains("flaky") && prompt.ends_with("(Request 3)")) {
        let err = json!({"error": {"code": 500, "message": "injected failure", "type": "server_error"}});
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response();
    }
    if prompt.contains("text-error") {
        return (StatusCode::SERVICE_UNAVAILABLE, "model is still loading").into_response();
    }
    if prompt.contains("slow") {
        tokio::time::sleep(SLOW_DELAY).await;
    }
    if stream {
        return streamed(script_for(&prompt));
    }
    if prompt.contains("bad-json") {
        return (StatusCode::OK, "<html>oops</html>").into_response();
    }
    if prompt.contains("bad-utf8") {
        return (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], b"{\"content\":\"a\xffb\"}".to_vec()).into_response();
    }
    if prompt.contains("missing-content") {
        return Json(json!({"stop": true, "tokens_predicted": 0})).into_response();
    }
    if prompt == "X" {
        return Json(json!({"content": "X"})).into_response();
    }
    Json(json!({"content": format!("completion for {}", prompt), "stop": true})).into_response()
}

fn script_for(prompt: &str) -> Vec<Vec<u8>> {
    if prompt.contains("stop-then-junk") {
        // stop line and undecodable trailing bytes arrive in one read
        return vec![b"{\"content\":\"ok\",\"stop\":true}\n\xff\xfe trailing\n".to_vec()];
    }
    let pieces: Vec<&'static str> = if prompt.contains("sse") {
        vec!["data: {\"content\":\"Hi\"}\n\n", "data: {\"content\":\" there\",\"stop\":true}\n\n"]
    } else if prompt.contains("garbage") {
        vec!["{\"content\":\"ok\"}\n", "this is not json\n", "{\"content\":\"!\",\"stop\":true}\n"]
    } else if prompt.contains("wrong-shape") {
        vec!["{\"content\":\"ok\"}\n", "[1, 2, 3]\n"]
    } else if prompt.contains("no-stop") {
        vec!["{\"content\":\"a\"}\n", "{\"content\":\"b\"}"]
    } else {
        // "Hel" "lo" "!" then a trailing chunk after stop; "lo" is split mid-line.
        vec![
            "{\"content\":\"Hel\"}\n",
            "{\"conte",
            "nt\":\"lo\"}\n",
            "{\"content\":\"!\",\"stop\":true}\n",
            "{\"content\":\" trailing\"}\n",
        ]
    };
    pieces.into_iter().map(|p| p.as_bytes().to_vec()).collect()
}

fn streamed(pieces: Vec<Vec<u8>>) -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, Infallible>>(4);
    tokio::spawn(async move {
        for piece in pieces {
            if tx.send(Ok(piece)).await.is_err() {
                return;
            }
            tokio::time::sleep(PIECE_DELAY).await;
        }
    });
    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(ReceiverStream::new(rx))).into_response()
}

/// Answers one request with `raw` verbatim and closes the socket.
pub async fn spawn_raw(raw: &'static [u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        // the JSON body is the last thing the client writes
        while !request.ends_with(b"}") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 { break; }
            request.extend_from_slice(&buf[..n]);
        }
        socket.write_all(raw).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{}:{}", addr.ip(), addr.port())
}
