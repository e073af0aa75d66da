//! Graph compilation and validation.
//!
//! Turns a [`GraphDefinition`] into an immutable [`Graph`]: resolves service
//! declarations against the host pool, builds the forward (`tree`) and
//! reverse (`reverse_tree`) edge maps, and proves acyclicity with Kahn's
//! algorithm. Compilation happens once at startup; a compiled graph is shared
//! read-only by every in-flight request.

use std::collections::{HashMap, HashSet};

use tracing::info;

use super::definition::{GraphDefinition, ServiceDefinition};
use super::error::{GraphError, GraphResult};
use crate::hosts::HostPool;

/// A resolved service: one node of a compiled graph.
#[derive(Debug, Clone)]
pub struct Service {
    /// Unique name within the graph; also the chunk name of its reply.
    pub name: String,
    /// Host pool group the dispatcher picks hosts from.
    pub hosts_from: String,
    /// Downstream path override; `None` forwards the inbound path.
    pub path: Option<String>,
}

/// An immutable compiled dependency graph.
///
/// `tree[a]` holds the services `a` depends on; `reverse_tree[b]` holds the
/// services that depend on `b`. The two maps are mutually consistent and the
/// relation is guaranteed acyclic.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Graph name, for diagnostics.
    pub name: String,
    pub(crate) services: HashMap<String, Service>,
    pub(crate) tree: HashMap<String, HashSet<String>>,
    pub(crate) reverse_tree: HashMap<String, HashSet<String>>,
}

impl Graph {
    /// Compile a declarative description into an executable graph.
    pub fn compile(name: &str, def: &GraphDefinition, hosts: &HostPool) -> GraphResult<Graph> {
        let mut services: HashMap<String, Service> = HashMap::new();
        let mut tree: HashMap<String, HashSet<String>> = HashMap::new();
        let mut reverse_tree: HashMap<String, HashSet<String>> = HashMap::new();

        for decl in &def.services {
            let service = match decl {
                ServiceDefinition::Name(name) => Service {
                    name: name.clone(),
                    hosts_from: name.clone(),
                    path: None,
                },
                ServiceDefinition::Full {
                    name,
                    hosts_from,
                    path,
                } => Service {
                    name: name.clone(),
                    hosts_from: hosts_from.clone().unwrap_or_else(|| name.clone()),
                    path: path.clone(),
                },
            };

            if !hosts.contains(&service.hosts_from) {
                return Err(GraphError::UnknownHostGroup(service.hosts_from));
            }
            if services.contains_key(&service.name) {
                return Err(GraphError::DuplicateService(service.name));
            }

            tree.insert(service.name.clone(), HashSet::new());
            services.insert(service.name.clone(), service);
        }

        for dep in &def.deps {
            if dep.a == dep.b {
                return Err(GraphError::SelfLoop(dep.a.clone()));
            }
            if !services.contains_key(&dep.a) {
                return Err(GraphError::UnknownService(dep.a.clone()));
            }
            if !services.contains_key(&dep.b) {
                return Err(GraphError::UnknownService(dep.b.clone()));
            }

            tree.entry(dep.a.clone())
                .or_default()
                .insert(dep.b.clone());
            reverse_tree
                .entry(dep.b.clone())
                .or_default()
                .insert(dep.a.clone());
        }

        check_acyclic(&tree, &reverse_tree)?;

        info!(
            graph = %name,
            services = services.len(),
            deps = def.deps.len(),
            "graph compiled"
        );

        Ok(Graph {
            name: name.to_string(),
            services,
            tree,
            reverse_tree,
        })
    }

    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Number of services in the graph.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True when the graph has no services.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Names of all services, in no particular order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Direct dependencies of a service.
    pub fn dependencies_of(&self, name: &str) -> Option<&HashSet<String>> {
        self.tree.get(name)
    }
}

/// Kahn's algorithm over working copies of the edge maps.
///
/// Each round extracts every node with an empty dependency set and erases it
/// from its dependents. A round that extracts nothing while work remains
/// proves a cycle.
fn check_acyclic(
    tree: &HashMap<String, HashSet<String>>,
    reverse_tree: &HashMap<String, HashSet<String>>,
) -> GraphResult<()> {
    let mut work = tree.clone();
    let mut reverse = reverse_tree.clone();

    while !work.is_empty() {
        let no_deps: Vec<String> = work
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        if no_deps.is_empty() {
            return Err(GraphError::Cycle);
        }

        for name in no_deps {
            if let Some(dependents) = reverse.remove(&name) {
                for dependent in dependents {
                    if let Some(deps) = work.get_mut(&dependent) {
                        deps.remove(&name);
                    }
                }
            }
            work.remove(&name);
        }
    }

    Ok(())
}
