//! Path-prefix route table.
//!
//! Maps inbound request paths onto graph names. Routes are compiled once at
//! startup and immutable afterwards: longest prefix wins, config order
//! breaks ties. No regex in the hot path.

use crate::config::RouteConfig;

/// Immutable route table.
pub struct RouteTable {
    /// `(prefix, graph)` pairs, longest prefix first; ties keep config order.
    routes: Vec<(String, String)>,
}

impl RouteTable {
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut routes: Vec<(String, String)> = routes
            .iter()
            .map(|route| (route.r.clone(), route.g.clone()))
            .collect();
        routes.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));
        Self { routes }
    }

    /// The graph name for a path, if any route matches.
    pub fn matched(&self, path: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, graph)| graph.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
