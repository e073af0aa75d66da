//! Per-request bookkeeping.
//!
//! A [`RequestState`] is created for each inbound request and owned by the
//! scheduler task driving it; nothing else mutates it. It holds a working
//! copy of the graph's dependency tree (`remaining`), the set of dispatched
//! services awaiting a reply (`in_progress`), and the accumulating aggregate.
//! At any instant a service lives in at most one of `remaining`,
//! `in_progress`, or the parts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method};

use super::compiler::{Graph, Service};
use super::multipart::MultipartResponse;

/// Marker header stamped on every outgoing dispatch so a downstream router
/// can detect nesting.
pub const NESTED_REQUEST_HEADER: &str = "x-routerd-request";

/// Connection-scoped headers never forwarded downstream.
const HOP_BY_HOP_HEADERS: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// The pieces of the inbound request the engine forwards downstream.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path and query of the inbound URI.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One outgoing downstream call, ready for dispatch.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Hook applied to each outgoing request before dispatch.
pub type PrepareOutgoing = Arc<dyn Fn(&RequestState, OutgoingRequest) -> OutgoingRequest + Send + Sync>;

/// Mutable state of one inbound request as it moves through the graph.
pub struct RequestState {
    pub(crate) graph: Arc<Graph>,
    pub(crate) inbound: InboundRequest,
    /// Outstanding prerequisites per not-yet-dispatched service.
    pub(crate) remaining: HashMap<String, HashSet<String>>,
    /// Dispatched services that have not replied yet.
    pub(crate) in_progress: HashSet<String>,
    pub(crate) parts: MultipartResponse,
    pub(crate) finalized: bool,
    prepare_outgoing: Option<PrepareOutgoing>,
}

impl RequestState {
    pub fn new(graph: Arc<Graph>, inbound: InboundRequest) -> Self {
        let remaining = graph.tree.clone();
        Self {
            graph,
            inbound,
            remaining,
            in_progress: HashSet::new(),
            parts: MultipartResponse::new(),
            finalized: false,
            prepare_outgoing: None,
        }
    }

    /// Install a transform applied to every outgoing request of this state.
    pub fn with_prepare_outgoing(mut self, hook: PrepareOutgoing) -> Self {
        self.prepare_outgoing = Some(hook);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    /// Services whose prerequisites have all completed and that have not
    /// been dispatched yet.
    pub(crate) fn ready_set(&self) -> Vec<String> {
        self.remaining
            .iter()
            .filter(|(name, deps)| deps.is_empty() && !self.in_progress.contains(*name))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Build the outgoing request for one service: inbound method, headers
    /// minus hop-by-hop, inbound body, the service's path override, and the
    /// nesting marker. The prepare hook runs last.
    pub(crate) fn outgoing_for(&self, service: &Service) -> OutgoingRequest {
        let mut headers = HeaderMap::new();
        for (header, value) in &self.inbound.headers {
            if HOP_BY_HOP_HEADERS.contains(&header.as_str()) {
                continue;
            }
            headers.append(header.clone(), value.clone());
        }
        headers.insert(
            HeaderName::from_static(NESTED_REQUEST_HEADER),
            HeaderValue::from_static("1"),
        );

        let path = service
            .path
            .clone()
            .unwrap_or_else(|| self.inbound.path.clone());

        let outgoing = OutgoingRequest {
            method: self.inbound.method.clone(),
            path,
            headers,
            body: self.inbound.body.clone(),
        };

        match &self.prepare_outgoing {
            Some(hook) => hook(self, outgoing),
            None => outgoing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::definition::GraphDefinition;
    use crate::hosts::HostPool;

    fn compile(def: &GraphDefinition, groups: &[&str]) -> Arc<Graph> {
        let spec = groups
            .iter()
            .map(|g| (g.to_string(), vec!["127.0.0.1:80".to_string()]))
            .collect();
        let pool = HostPool::from_config(&spec).unwrap();
        Arc::new(Graph::compile("main", def, &pool).unwrap())
    }

    fn inbound() -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(http::header::CONNECTION, HeaderValue::from_static("close"));
        headers.insert(http::header::HOST, HeaderValue::from_static("router"));
        InboundRequest {
            method: Method::GET,
            path: "/x?q=1".to_string(),
            headers,
            body: Bytes::from_static(b"payload"),
        }
    }

    #[test]
    fn initial_ready_set_is_the_dependency_free_services() {
        let mut def = GraphDefinition::new();
        def.add_service("a")
            .add_service("b")
            .add_service("c")
            .add_dep("c", "a")
            .add_dep("c", "b");
        let state = RequestState::new(compile(&def, &["a", "b", "c"]), inbound());

        let mut ready = state.ready_set();
        ready.sort();
        assert_eq!(ready, ["a", "b"]);
    }

    #[test]
    fn in_progress_services_leave_the_ready_set() {
        let mut def = GraphDefinition::new();
        def.add_service("a");
        let mut state = RequestState::new(compile(&def, &["a"]), inbound());

        state.in_progress.insert("a".to_string());
        assert!(state.ready_set().is_empty());
    }

    #[test]
    fn outgoing_strips_hop_by_hop_and_stamps_the_marker() {
        let mut def = GraphDefinition::new();
        def.add_service("a");
        let graph = compile(&def, &["a"]);
        let state = RequestState::new(graph.clone(), inbound());

        let service = graph.service("a").unwrap();
        let outgoing = state.outgoing_for(service);

        assert_eq!(outgoing.method, Method::GET);
        assert_eq!(outgoing.path, "/x?q=1");
        assert_eq!(outgoing.body, Bytes::from_static(b"payload"));
        assert!(outgoing.headers.contains_key(http::header::ACCEPT));
        assert!(!outgoing.headers.contains_key(http::header::CONNECTION));
        assert!(!outgoing.headers.contains_key(http::header::HOST));
        assert_eq!(outgoing.headers.get(NESTED_REQUEST_HEADER).unwrap(), "1");
    }

    #[test]
    fn service_path_overrides_the_inbound_path() {
        let json = r#"{ "services": [ { "name": "a", "path": "/internal" } ] }"#;
        let def: GraphDefinition = serde_json::from_str(json).unwrap();
        let graph = compile(&def, &["a"]);
        let state = RequestState::new(graph.clone(), inbound());

        let outgoing = state.outgoing_for(graph.service("a").unwrap());
        assert_eq!(outgoing.path, "/internal");
    }

    #[test]
    fn prepare_hook_sees_and_transforms_the_outgoing_request() {
        let mut def = GraphDefinition::new();
        def.add_service("a");
        let graph = compile(&def, &["a"]);
        let state = RequestState::new(graph.clone(), inbound()).with_prepare_outgoing(Arc::new(
            |_state: &RequestState, mut outgoing: OutgoingRequest| {
                outgoing.headers.insert(
                    HeaderName::from_static("x-trace"),
                    HeaderValue::from_static("t1"),
                );
                outgoing
            },
        ));

        let outgoing = state.outgoing_for(graph.service("a").unwrap());
        assert_eq!(outgoing.headers.get("x-trace").unwrap(), "t1");
    }
}
