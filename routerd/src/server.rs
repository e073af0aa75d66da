//! HTTP server wiring.
//!
//! Builds the axum application around the engine: each inbound request is
//! guarded against router-to-router loops, matched to a graph by path
//! prefix, buffered, and handed to the scheduler; the resulting aggregate is
//! written back as one `multipart/mixed` response.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::validation::validate_config;
use crate::config::RouterConfig;
use crate::graph::{
    Graph, HttpDispatcher, InboundRequest, RequestState, Scheduler, NESTED_REQUEST_HEADER,
};
use crate::hosts::HostPool;
use crate::routing::RouteTable;

/// Application state shared by all inbound connections.
pub struct AppState {
    graphs: HashMap<String, Arc<Graph>>,
    routes: RouteTable,
    scheduler: Scheduler,
    allow_nested_requests: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("graphs", &self.graphs.keys().collect::<Vec<_>>())
            .field("allow_nested_requests", &self.allow_nested_requests)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Compile every graph and assemble the shared state. Any failure here
    /// is a configuration error and aborts startup.
    pub fn from_config(config: &RouterConfig) -> anyhow::Result<Self> {
        if let Err(errors) = validate_config(config) {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("invalid configuration: {joined}");
        }

        let hosts = Arc::new(HostPool::from_config(&config.hosts)?);

        let mut graphs = HashMap::new();
        for (name, def) in &config.graphs {
            let graph = Graph::compile(name, def, &hosts)
                .with_context(|| format!("graph '{name}'"))?;
            graphs.insert(name.clone(), Arc::new(graph));
        }

        let dispatcher = Arc::new(HttpDispatcher::new(hosts, config.dispatch_timeout()));
        let scheduler = Scheduler::new(dispatcher, config.request_deadline());

        Ok(Self {
            graphs,
            routes: RouteTable::from_config(&config.routes),
            scheduler,
            allow_nested_requests: config.allow_nested_requests,
        })
    }
}

/// Build the axum application.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(route_request))
        .route("/{*path}", any(route_request))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Handle one inbound request end to end.
async fn route_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    if !state.allow_nested_requests && request.headers().contains_key(NESTED_REQUEST_HEADER) {
        warn!("rejecting nested router request");
        return (StatusCode::LOOP_DETECTED, "nested router request rejected").into_response();
    }

    let path = request.uri().path().to_string();
    let Some(graph_name) = state.routes.matched(&path) else {
        debug!(path = %path, "no route matched");
        return (StatusCode::NOT_FOUND, "no matching route").into_response();
    };
    let Some(graph) = state.graphs.get(graph_name) else {
        error!(graph = %graph_name, "route references a graph that was not compiled");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or(path);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(error) => {
            warn!(error = %error, "failed to buffer request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    let inbound = InboundRequest {
        method: parts.method,
        path: path_and_query,
        headers: parts.headers,
        body,
    };

    debug!(graph = %graph_name, services = graph.len(), "scheduling request");
    match state.scheduler.run(RequestState::new(graph.clone(), inbound)).await {
        Ok(aggregate) => {
            let (content_type, body) = aggregate.serialize();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type)],
                body,
            )
                .into_response()
        }
        Err(error) => {
            error!(graph = %graph_name, error = %error, "request aborted");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Resolve the listen addresses from the bind config. With neither address
/// set the server listens on all IPv4 interfaces.
fn listen_addrs(config: &RouterConfig) -> anyhow::Result<Vec<SocketAddr>> {
    let mut addrs = Vec::new();

    if !config.bind4.is_empty() {
        let ip: std::net::Ipv4Addr = config
            .bind4
            .parse()
            .with_context(|| format!("invalid bind4 address '{}'", config.bind4))?;
        addrs.push(SocketAddr::new(IpAddr::V4(ip), config.port));
    }
    if !config.bind6.is_empty() {
        let ip: std::net::Ipv6Addr = config
            .bind6
            .parse()
            .with_context(|| format!("invalid bind6 address '{}'", config.bind6))?;
        addrs.push(SocketAddr::new(IpAddr::V6(ip), config.port));
    }
    if addrs.is_empty() {
        addrs.push(SocketAddr::new(
            IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            config.port,
        ));
    }

    Ok(addrs)
}

/// Bind the configured listeners and serve until shutdown.
pub async fn run(config: RouterConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let app = build_app(state);

    let mut servers = Vec::new();
    for addr in listen_addrs(&config)? {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(address = %addr, "listening");

        let app = app.clone();
        servers.push(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        }));
    }

    for server in servers {
        server.await??;
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for ctrl-c.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}
