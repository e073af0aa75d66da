//! The graph execution engine.
//!
//! Compiles declarative dependency descriptions into executable DAGs and
//! drives one inbound request across each graph's services:
//!
//! ```text
//!  Graph description (config JSON)
//!          │
//!          ▼
//!  compiler (validation + Kahn acyclicity proof)
//!          │
//!          ▼
//!  scheduler (ready-set event loop, one owning task per request)
//!          │
//!          ▼
//!  dispatcher (one HTTP call per service, failures become synthetic replies)
//!          │
//!          ▼
//!  multipart aggregate (one named part per service, insertion-ordered)
//! ```
//!
//! A dependent service is never dispatched before every one of its
//! prerequisites has delivered a reply, each service is dispatched at most
//! once per request, and the request finalizes exactly once — on drain or on
//! deadline.

pub mod compiler;
pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod multipart;
pub mod scheduler;
pub mod state;

pub use compiler::{Graph, Service};
pub use definition::{DepDefinition, GraphDefinition, ServiceDefinition};
pub use dispatcher::{Dispatch, HttpDispatcher};
pub use error::{EngineError, GraphError, GraphResult};
pub use multipart::{DownstreamReply, MultipartResponse, DEFAULT_CHUNK_NAME, ERROR_HEADER};
pub use scheduler::Scheduler;
pub use state::{InboundRequest, OutgoingRequest, PrepareOutgoing, RequestState, NESTED_REQUEST_HEADER};
