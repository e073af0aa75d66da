//! routerd — fan-out HTTP request router.
//!
//! Dispatches one inbound request across a static DAG of downstream HTTP
//! services and aggregates their replies into a single `multipart/mixed`
//! response. Downstream failures never fail the inbound request; each
//! service's part carries its own status.
//!
//! ```text
//!   client ──▶ server (route match) ──▶ graph::Scheduler
//!                                           │  fan-out in dependency order
//!                                           ▼
//!                                  graph::HttpDispatcher ──▶ downstream mesh
//!                                           │  completions
//!                                           ▼
//!                                  graph::MultipartResponse ──▶ client
//! ```

pub mod config;
pub mod graph;
pub mod hosts;
pub mod routing;
pub mod server;

pub use config::RouterConfig;
pub use graph::{Graph, MultipartResponse, RequestState, Scheduler};
pub use hosts::HostPool;
pub use server::{build_app, AppState};
