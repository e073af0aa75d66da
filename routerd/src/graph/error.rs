//! Error types for the graph engine.

use thiserror::Error;

/// Result type for graph compilation.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while compiling a declarative graph description.
///
/// All of these are configuration mistakes and abort startup; none can occur
/// once a graph has been compiled.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// The same service name was declared twice.
    #[error("service already present: {0}")]
    DuplicateService(String),

    /// A service references a host group the host pool does not know.
    #[error("unknown hosts group: {0}")]
    UnknownHostGroup(String),

    /// A dependency names a service that was never declared.
    #[error("unknown service in dependency: {0}")]
    UnknownService(String),

    /// A service was declared to depend on itself.
    #[error("{0} depends on itself")]
    SelfLoop(String),

    /// The dependency relation contains a cycle.
    #[error("cycle in dependencies")]
    Cycle,
}

/// Errors raised by the scheduler while driving a request.
///
/// These indicate an engine bug rather than a downstream failure; the
/// affected request is answered with 500 and the process keeps serving.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A chunk name was inserted into the aggregate twice.
    #[error("duplicate part: {0}")]
    DuplicatePart(String),

    /// An invariant the scheduler relies on did not hold.
    #[error("internal scheduler error: {0}")]
    Internal(String),
}
