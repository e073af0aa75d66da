//! The graph execution event loop.
//!
//! One scheduler drives one [`RequestState`] from start to finalization. The
//! state is confined to the task running [`Scheduler::run`]; dispatches are
//! spawned tasks that deliver completions over an mpsc channel drained only
//! by that task, so every mutation of the state is serialized without locks.
//!
//! The loop dispatches the ready set, waits for completions, merges each
//! reply into the aggregate, erases the completed service from its
//! dependents' prerequisites, and dispatches whatever became ready. It
//! finalizes exactly once: when both the prerequisite map and the in-flight
//! set have drained, or when the request deadline expires, whichever comes
//! first. Replies arriving after finalization find the channel closed and
//! are dropped.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::dispatcher::Dispatch;
use super::error::EngineError;
use super::multipart::{DownstreamReply, MultipartResponse};
use super::state::RequestState;

/// A downstream reply tagged with the service it belongs to.
pub(crate) struct Completion {
    pub service: String,
    pub reply: DownstreamReply,
}

type CompletionSender = mpsc::UnboundedSender<Completion>;

/// Drives request states through their graphs.
pub struct Scheduler {
    dispatcher: Arc<dyn Dispatch>,
    request_deadline: Duration,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<dyn Dispatch>, request_deadline: Duration) -> Self {
        Self {
            dispatcher,
            request_deadline,
        }
    }

    /// Drive one request to finalization and return the aggregate.
    ///
    /// Dropping the returned future (client disconnect) closes the
    /// completion channel; in-flight dispatches run to completion for pool
    /// hygiene and their replies are discarded.
    pub async fn run(&self, mut state: RequestState) -> Result<MultipartResponse, EngineError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let deadline = Instant::now() + self.request_deadline;

        self.start(&mut state, &tx)?;

        while !state.finalized {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(completion)) => self.on_reply(&mut state, completion, &tx)?,
                Ok(None) => {
                    return Err(EngineError::Internal(
                        "completion channel closed before finalization".to_string(),
                    ));
                }
                Err(_) => self.expire(&mut state),
            }
        }

        debug!(
            graph = %state.graph.name,
            parts = state.parts.len(),
            "request finalized"
        );
        Ok(state.parts)
    }

    /// Dispatch the initial ready set. An empty graph finalizes on the spot;
    /// a non-empty graph with nothing dispatchable cannot happen once
    /// compilation proved acyclicity, so it is reported as an engine bug.
    fn start(&self, state: &mut RequestState, tx: &CompletionSender) -> Result<(), EngineError> {
        if state.remaining.is_empty() && state.in_progress.is_empty() {
            state.finalized = true;
            return Ok(());
        }

        let ready = state.ready_set();
        if ready.is_empty() {
            return Err(EngineError::Internal(format!(
                "{} services pending with no dispatchable dependency",
                state.remaining.len()
            )));
        }

        self.dispatch_all(state, ready, tx);
        Ok(())
    }

    /// Merge one completion into the state and dispatch whatever it freed.
    fn on_reply(
        &self,
        state: &mut RequestState,
        completion: Completion,
        tx: &CompletionSender,
    ) -> Result<(), EngineError> {
        let Completion { service, reply } = completion;

        if state.finalized {
            debug!(service = %service, "late reply after finalization, dropping");
            return Ok(());
        }
        if !state.in_progress.remove(&service) {
            warn!(service = %service, "reply for a service that is not in flight, dropping");
            return Ok(());
        }

        debug!(
            graph = %state.graph.name,
            service = %service,
            status = %reply.status,
            "reply processed"
        );
        state.parts.add_part(service.clone(), reply)?;

        if let Some(dependents) = state.graph.reverse_tree.get(&service) {
            for dependent in dependents {
                if let Some(deps) = state.remaining.get_mut(dependent) {
                    deps.remove(&service);
                }
            }
        }

        let ready = state.ready_set();
        self.dispatch_all(state, ready, tx);

        if state.remaining.is_empty() && state.in_progress.is_empty() {
            state.finalized = true;
        }
        Ok(())
    }

    /// Move each ready service into the in-flight set and spawn its
    /// dispatch. Order within one ready set is unspecified.
    fn dispatch_all(&self, state: &mut RequestState, ready: Vec<String>, tx: &CompletionSender) {
        for name in ready {
            state.remaining.remove(&name);
            state.in_progress.insert(name.clone());

            let Some(service) = state.graph.service(&name) else {
                // Unreachable on a compiled graph; keep the request moving.
                let _ = tx.send(Completion {
                    service: name.clone(),
                    reply: DownstreamReply::synthetic(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("service {name} missing from graph"),
                    ),
                });
                continue;
            };

            let outgoing = state.outgoing_for(service);
            let service = service.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = dispatcher.dispatch(&service, outgoing).await;
                // The receiver is gone once the request finalized; a failed
                // send is a discarded late reply.
                let _ = tx.send(Completion {
                    service: service.name,
                    reply,
                });
            });
        }
    }

    /// Forced finalization on request deadline: every in-flight service gets
    /// a synthetic 504 part, pending services are dropped, and no further
    /// dispatches occur.
    fn expire(&self, state: &mut RequestState) {
        warn!(
            graph = %state.graph.name,
            in_flight = state.in_progress.len(),
            pending = state.remaining.len(),
            "request deadline exceeded, finalizing with partial parts"
        );

        let in_flight: Vec<String> = state.in_progress.drain().collect();
        for service in in_flight {
            if let Err(error) = state.parts.add_part(
                service,
                DownstreamReply::synthetic(StatusCode::GATEWAY_TIMEOUT, "request deadline exceeded"),
            ) {
                warn!(error = %error, "part conflict during forced finalization");
            }
        }
        state.remaining.clear();
        state.finalized = true;
    }
}
