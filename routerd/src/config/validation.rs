//! Cross-reference validation of a parsed config.
//!
//! Host syntax and graph structure are checked where they are compiled
//! (`HostPool::from_config`, `Graph::compile`); this pass covers the
//! references between sections.

use std::fmt;

use super::RouterConfig;

/// One validation failure, rendered as a diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate the references between config sections.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for route in &config.routes {
        if !config.graphs.contains_key(&route.g) {
            errors.push(ValidationError(format!(
                "route '{}' references unknown graph '{}'",
                route.r, route.g
            )));
        }
        if route.r.is_empty() {
            errors.push(ValidationError(format!(
                "route for graph '{}' has an empty pattern",
                route.g
            )));
        }
    }

    for name in config.graphs.keys() {
        if !config.routes.iter().any(|route| &route.g == name) {
            tracing::warn!(graph = %name, "graph is not reachable from any route");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
