//! Declarative graph description types.
//!
//! This is the schema users provide in the `graphs` section of the config
//! file. A graph is a list of services plus a list of dependencies; the
//! compiler turns it into an executable [`Graph`](super::compiler::Graph).
//!
//! A service can be declared as a bare name or as an object:
//!
//! ```json
//! {
//!   "services": [
//!     "auth",
//!     { "name": "news", "hosts_from": "news-backends", "path": "/v2/news" }
//!   ],
//!   "deps": [ { "a": "news", "b": "auth" } ]
//! }
//! ```
//!
//! A dep `{a, b}` reads "`a` depends on `b`": `b` must reply before `a` is
//! dispatched.

use serde::Deserialize;

/// Complete declarative description of one dependency graph.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphDefinition {
    /// Service declarations.
    pub services: Vec<ServiceDefinition>,

    /// Dependency declarations; absent means fully parallel fan-out.
    #[serde(default)]
    pub deps: Vec<DepDefinition>,
}

impl GraphDefinition {
    /// Create an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a service by bare name.
    pub fn add_service(&mut self, name: impl Into<String>) -> &mut Self {
        self.services.push(ServiceDefinition::Name(name.into()));
        self
    }

    /// Declare a dependency: `a` waits for `b`.
    pub fn add_dep(&mut self, a: impl Into<String>, b: impl Into<String>) -> &mut Self {
        self.deps.push(DepDefinition {
            a: a.into(),
            b: b.into(),
        });
        self
    }
}

/// One service declaration: either a bare name or a full object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServiceDefinition {
    /// Bare name; the host group defaults to the same name.
    Name(String),

    /// Full form with optional host group and downstream path overrides.
    Full {
        name: String,
        #[serde(default)]
        hosts_from: Option<String>,
        #[serde(default)]
        path: Option<String>,
    },
}

impl ServiceDefinition {
    /// The declared service name.
    pub fn name(&self) -> &str {
        match self {
            ServiceDefinition::Name(name) => name,
            ServiceDefinition::Full { name, .. } => name,
        }
    }
}

/// One dependency declaration: `a` depends on `b`.
#[derive(Debug, Clone, Deserialize)]
pub struct DepDefinition {
    pub a: String,
    pub b: String,
}
