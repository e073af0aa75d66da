//! Static host groups and per-call host selection.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// One downstream endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHost {
    pub addr: String,
    pub port: u16,
}

impl fmt::Display for ServiceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Errors raised while building the host pool from config.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HostPoolError {
    #[error("{group} has no hosts")]
    EmptyGroup { group: String },

    #[error("{group}: {host} has no port specified")]
    MissingPort { group: String, host: String },

    #[error("{group}: {host} has an invalid port")]
    InvalidPort { group: String, host: String },
}

#[derive(Debug)]
struct HostGroup {
    hosts: Vec<ServiceHost>,
    cursor: AtomicUsize,
}

/// Immutable `group → [host:port]` table with round-robin selection.
///
/// Built once at startup and shared read-only; the per-group cursor is the
/// only mutable state and is advanced atomically.
#[derive(Debug)]
pub struct HostPool {
    groups: HashMap<String, HostGroup>,
}

impl HostPool {
    /// Parse the `hosts` config section. Every entry is `host:port`; the
    /// port is split off at the last colon so IPv6 literals work.
    pub fn from_config(spec: &HashMap<String, Vec<String>>) -> Result<Self, HostPoolError> {
        let mut groups = HashMap::new();

        for (group, entries) in spec {
            if entries.is_empty() {
                return Err(HostPoolError::EmptyGroup {
                    group: group.clone(),
                });
            }

            let mut hosts = Vec::with_capacity(entries.len());
            for entry in entries {
                let Some(colon) = entry.rfind(':') else {
                    return Err(HostPoolError::MissingPort {
                        group: group.clone(),
                        host: entry.clone(),
                    });
                };
                let port: u16 =
                    entry[colon + 1..]
                        .parse()
                        .map_err(|_| HostPoolError::InvalidPort {
                            group: group.clone(),
                            host: entry.clone(),
                        })?;
                hosts.push(ServiceHost {
                    addr: entry[..colon].to_string(),
                    port,
                });
            }

            groups.insert(
                group.clone(),
                HostGroup {
                    hosts,
                    cursor: AtomicUsize::new(0),
                },
            );
        }

        Ok(Self { groups })
    }

    /// True when the pool knows the group.
    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Pick the next host of a group, round-robin. `None` for unknown groups.
    pub fn pick(&self, group: &str) -> Option<&ServiceHost> {
        let group = self.groups.get(group)?;
        let index = group.cursor.fetch_add(1, Ordering::Relaxed) % group.hosts.len();
        group.hosts.get(index)
    }

    /// Group names, in no particular order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(group, hosts)| {
                (
                    group.to_string(),
                    hosts.iter().map(|h| h.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn round_robin_cycles_through_the_group() {
        let pool = HostPool::from_config(&spec(&[(
            "api",
            &["a:8001", "b:8002", "c:8003"],
        )]))
        .unwrap();

        let picks: Vec<String> = (0..6).map(|_| pool.pick("api").unwrap().to_string()).collect();
        assert_eq!(picks[0..3], picks[3..6]);

        let mut first_round = picks[0..3].to_vec();
        first_round.sort();
        assert_eq!(first_round, ["a:8001", "b:8002", "c:8003"]);
    }

    #[test]
    fn unknown_group_yields_nothing() {
        let pool = HostPool::from_config(&spec(&[("api", &["a:80"])])).unwrap();
        assert!(pool.pick("ghost").is_none());
        assert!(!pool.contains("ghost"));
        assert!(pool.contains("api"));
    }

    #[test]
    fn rejects_empty_group() {
        let err = HostPool::from_config(&spec(&[("api", &[])])).unwrap_err();
        assert_eq!(
            err,
            HostPoolError::EmptyGroup {
                group: "api".into()
            }
        );
    }

    #[test]
    fn rejects_host_without_port() {
        let err = HostPool::from_config(&spec(&[("api", &["nakedhost"])])).unwrap_err();
        assert_eq!(
            err,
            HostPoolError::MissingPort {
                group: "api".into(),
                host: "nakedhost".into()
            }
        );
    }

    #[test]
    fn rejects_unparseable_port() {
        let err = HostPool::from_config(&spec(&[("api", &["host:http"])])).unwrap_err();
        assert!(matches!(err, HostPoolError::InvalidPort { .. }));
    }

    #[test]
    fn ipv6_literal_splits_at_the_last_colon() {
        let pool = HostPool::from_config(&spec(&[("api", &["::1:9000"])])).unwrap();
        let host = pool.pick("api").unwrap();
        assert_eq!(host.addr, "::1");
        assert_eq!(host.port, 9000);
    }
}
