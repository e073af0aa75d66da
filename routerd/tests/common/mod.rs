//! Shared helpers for integration tests: mock downstream backends, an
//! in-process router instance, and a parser for the aggregate wire format.

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::Router;
use tokio::net::TcpListener;

use routerd::config::RouterConfig;
use routerd::{build_app, AppState};

/// Start a mock downstream that returns a fixed reply after a delay.
pub async fn spawn_backend(status: StatusCode, body: &'static str, delay: Duration) -> SocketAddr {
    let handler = move || async move {
        tokio::time::sleep(delay).await;
        (status, body)
    };
    serve(Router::new().fallback(handler)).await
}

/// Start a mock downstream that counts the requests it receives.
pub async fn spawn_counting_backend(
    status: StatusCode,
    body: &'static str,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let handler = move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (status, body)
        }
    };
    (serve(Router::new().fallback(handler)).await, hits)
}

/// Start a mock downstream that echoes the request body it received.
pub async fn spawn_echo_backend() -> SocketAddr {
    let handler = |body: String| async move { (StatusCode::OK, format!("echo:{body}")) };
    serve(Router::new().fallback(handler)).await
}

/// Start a mock downstream that reports whether the router's nesting marker
/// header was present on the request it saw.
pub async fn spawn_marker_probe_backend() -> SocketAddr {
    let handler = |headers: HeaderMap| async move {
        if headers.contains_key("x-routerd-request") {
            (StatusCode::OK, "marked")
        } else {
            (StatusCode::OK, "unmarked")
        }
    };
    serve(Router::new().fallback(handler)).await
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Boot a router from a JSON config on an ephemeral port; returns its base URL.
pub async fn spawn_router(config: serde_json::Value) -> String {
    let config: RouterConfig = serde_json::from_value(config).unwrap();
    let state = Arc::new(AppState::from_config(&config).unwrap());
    let addr = serve(build_app(state)).await;
    format!("http://{addr}")
}

/// One parsed part of an aggregate response.
#[derive(Debug)]
pub struct Part {
    pub name: String,
    /// Status line of the embedded downstream response.
    pub status_line: String,
    /// Raw header block of the embedded downstream response.
    pub head: String,
    pub body: String,
}

/// Parse a `multipart/mixed` aggregate into its parts, in wire order.
pub fn parse_multipart(content_type: &str, body: &str) -> Vec<Part> {
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .expect("content type carries a boundary");
    let delimiter = format!("--{boundary}");

    let mut parts = Vec::new();
    for segment in body.split(&delimiter) {
        let segment = segment.strip_prefix("\r\n").unwrap_or(segment);
        if segment.is_empty() || segment.starts_with("--") {
            continue;
        }

        let (disposition, embedded) = segment
            .split_once("\r\n\r\n")
            .expect("part has a disposition block");
        let name = disposition
            .split("name=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .expect("disposition names the part")
            .to_string();

        let (head, embedded_body) = embedded.split_once("\r\n\r\n").unwrap_or((embedded, ""));
        let status_line = head.lines().next().unwrap_or_default().to_string();
        let body = embedded_body
            .strip_suffix("\r\n")
            .unwrap_or(embedded_body)
            .to_string();

        parts.push(Part {
            name,
            status_line,
            head: head.to_string(),
            body,
        });
    }
    parts
}
