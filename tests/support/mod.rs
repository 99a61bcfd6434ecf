//! Scripted stand-in for the Ollama HTTP API.
#![allow(dead_code)]

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{StreamExt, stream};
use kestrel::KestrelConfig;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const MODEL: &str = "internlm2:1.8b";

#[derive(Clone, Debug)]
pub enum Chunk {
    Data(String),
    Pause(Duration),
}

pub fn data(text: &str) -> Chunk {
    Chunk::Data(text.to_string())
}

pub type Recorded = Arc<Mutex<Vec<(String, Value)>>>;

#[derive(Clone)]
pub struct MockOllama {
    tags_status: StatusCode,
    tags_body: String,
    pull_status: StatusCode,
    pull: Vec<Chunk>,
    generate_status: StatusCode,
    generate: Vec<Chunk>,
    requests: Recorded,
}

impl MockOllama {
    pub fn new() -> Self {
        Self {
            tags_status: StatusCode::OK,
            tags_body: format!(r#"{{"models":[{{"name":"{MODEL}","size":1100000000}}]}}"#),
            pull_status: StatusCode::OK,
            pull: Vec::new(),
            generate_status: StatusCode::OK,
            generate: Vec::new(),
            requests: Arc::default(),
        }
    }

    pub fn tags(mut self, status: StatusCode, body: &str) -> Self {
        self.tags_status = status;
        self.tags_body = body.to_string();
        self
    }

    pub fn pull(mut self, status: StatusCode, chunks: Vec<Chunk>) -> Self {
        self.pull_status = status;
        self.pull = chunks;
        self
    }

    pub fn generate(mut self, status: StatusCode, chunks: Vec<Chunk>) -> Self {
        self.generate_status = status;
        self.generate = chunks;
        self
    }

    pub async fn start(self) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = self.requests.clone();

        let app = Router::new()
            .route("/api/tags", get(tags))
            .route("/api/pull", post(pull))
            .route("/api/generate", post(generate))
            .with_state(Arc::new(self));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockServer {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    fn record(&self, path: &str, body: Value) {
        self.requests.lock().unwrap().push((path.to_string(), body));
    }
}

pub struct MockServer {
    pub base_url: String,
    requests: Recorded,
}

impl MockServer {
    pub fn config(&self) -> KestrelConfig {
        KestrelConfig::default()
            .with_base_url(&self.base_url)
            .with_model(MODEL)
    }

    /// Bodies posted to `path`, oldest first.
    pub fn posted(&self, path: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

/// Address of a port nobody listens on.
pub async fn dead_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn chunked(chunks: Vec<Chunk>) -> Body {
    let body = stream::iter(chunks)
        .then(|chunk| async move {
            match chunk {
                Chunk::Data(text) => text,
                Chunk::Pause(pause) => {
                    tokio::time::sleep(pause).await;
                    String::new()
                }
            }
        })
        .map(Ok::<_, Infallible>);
    Body::from_stream(body)
}

async fn tags(State(mock): State<Arc<MockOllama>>) -> Response {
    (mock.tags_status, mock.tags_body.clone()).into_response()
}

async fn pull(State(mock): State<Arc<MockOllama>>, Json(body): Json<Value>) -> Response {
    mock.record("/api/pull", body);
    if mock.pull_status != StatusCode::OK {
        return (mock.pull_status, "pull failed").into_response();
    }
    (StatusCode::OK, chunked(mock.pull.clone())).into_response()
}

async fn generate(State(mock): State<Arc<MockOllama>>, Json(body): Json<Value>) -> Response {
    mock.record("/api/generate", body);
    if mock.generate_status != StatusCode::OK {
        return (mock.generate_status, "boom").into_response();
    }
    (StatusCode::OK, chunked(mock.generate.clone())).into_response()
}
