// Fake Hauk backend shared by the integration tests.
#![allow(dead_code)]

use axum::{Form, Router, extract::State, http::StatusCode, routing::post};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Fields = HashMap<String, String>;

// One recorded request: endpoint name plus the decoded form body.
#[derive(Debug, Clone)]
pub struct Hit {
    pub endpoint: &'static str,
    pub fields: Fields,
}

#[derive(Default)]
struct Inner {
    hits: Vec<Hit>,
    replies: HashMap<&'static str, VecDeque<(StatusCode, Vec<u8>)>>,
}

#[derive(Clone)]
pub struct FakeHauk {
    inner: Arc<Mutex<Inner>>,
    // Root the app is mounted under, always ending in '/'.
    pub base_url: String,
}

impl FakeHauk {
    // Serve the Hauk endpoints under `mount` (e.g. "/" or "/hauk/") on an ephemeral port.
    pub async fn start(mount: &str) -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));

        let api = Router::new()
            .route("/api/create", post(create))
            .route("/api/post", post(post_location))
            .route("/api/stop", post(stop))
            .with_state(inner.clone());
        let prefix = mount.trim_end_matches('/');
        let app = if prefix.is_empty() {
            api
        } else {
            Router::new().nest(prefix, api)
        };

        // Bind to an ephemeral port to avoid collisions with local services.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral test port");
        let addr = listener.local_addr().expect("get local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake hauk failed");
        });

        Self {
            inner,
            base_url: format!("http://{addr}{prefix}/"),
        }
    }

    // Queue the next reply for an endpoint ("create", "post" or "stop").
    pub fn reply(&self, endpoint: &'static str, status: StatusCode, body: &str) {
        self.reply_bytes(endpoint, status, body.as_bytes().to_vec());
    }

    // Queue a raw body, which need not be valid text.
    pub fn reply_bytes(&self, endpoint: &'static str, status: StatusCode, body: Vec<u8>) {
        let mut guard = self.inner.lock().expect("fake hauk mutex poisoned");
        guard
            .replies
            .entry(endpoint)
            .or_default()
            .push_back((status, body));
    }

    pub fn hits(&self, endpoint: &str) -> Vec<Fields> {
        let guard = self.inner.lock().expect("fake hauk mutex poisoned");
        guard
            .hits
            .iter()
            .filter(|hit| hit.endpoint == endpoint)
            .map(|hit| hit.fields.clone())
            .collect()
    }

    pub fn all_hits(&self) -> Vec<Hit> {
        self.inner
            .lock()
            .expect("fake hauk mutex poisoned")
            .hits
            .clone()
    }

    // Poll until `endpoint` has seen at least `count` requests.
    pub async fn wait_for_hits(&self, endpoint: &str, count: usize) -> Vec<Fields> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let hits = self.hits(endpoint);
                if hits.len() >= count {
                    return hits;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{endpoint} did not receive {count} requests in time"))
    }
}

fn record(
    inner: &Mutex<Inner>,
    endpoint: &'static str,
    fields: Fields,
    default_body: impl FnOnce() -> String,
) -> (StatusCode, Vec<u8>) {
    let mut guard = inner.lock().expect("fake hauk mutex poisoned");
    guard.hits.push(Hit { endpoint, fields });
    guard
        .replies
        .get_mut(endpoint)
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| (StatusCode::OK, default_body().into_bytes()))
}

async fn create(
    State(inner): State<Arc<Mutex<Inner>>>,
    Form(fields): Form<Fields>,
) -> (StatusCode, Vec<u8>) {
    record(&inner, "create", fields, || {
        "OK\nSID-1\nhttps://viewer.example/?ABCD\nABCD\n".to_string()
    })
}

async fn post_location(
    State(inner): State<Arc<Mutex<Inner>>>,
    Form(fields): Form<Fields>,
) -> (StatusCode, Vec<u8>) {
    record(&inner, "post", fields, || "OK\n".to_string())
}

async fn stop(
    State(inner): State<Arc<Mutex<Inner>>>,
    Form(fields): Form<Fields>,
) -> (StatusCode, Vec<u8>) {
    record(&inner, "stop", fields, || "OK\n".to_string())
}
