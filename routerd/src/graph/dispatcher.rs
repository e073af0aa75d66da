//! Downstream HTTP dispatch.
//!
//! A dispatcher performs one outgoing call and always produces a
//! [`DownstreamReply`]: transport failures, timeouts, and parse failures are
//! converted into synthetic status-carrying replies instead of propagating.
//! A failed downstream therefore never fails the inbound request; its part
//! simply carries the error status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{debug, warn};

use super::compiler::Service;
use super::multipart::DownstreamReply;
use super::state::OutgoingRequest;
use crate::hosts::HostPool;

/// One downstream call. Implementations never error upward; failures become
/// synthetic replies.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, service: &Service, outgoing: OutgoingRequest) -> DownstreamReply;
}

/// Dispatcher backed by a pooled `reqwest` client.
pub struct HttpDispatcher {
    hosts: Arc<HostPool>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(hosts: Arc<HostPool>, timeout: Duration) -> Self {
        Self {
            hosts,
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn dispatch(&self, service: &Service, outgoing: OutgoingRequest) -> DownstreamReply {
        let Some(host) = self.hosts.pick(&service.hosts_from) else {
            warn!(
                service = %service.name,
                group = %service.hosts_from,
                "no hosts available for group"
            );
            return DownstreamReply::synthetic(
                StatusCode::SERVICE_UNAVAILABLE,
                &format!("no hosts available for group {}", service.hosts_from),
            );
        };

        let url = format!("http://{}{}", host, outgoing.path);
        debug!(service = %service.name, url = %url, method = %outgoing.method, "dispatching");

        let result = self
            .client
            .request(outgoing.method, &url)
            .headers(outgoing.headers)
            .body(outgoing.body)
            .timeout(self.timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                warn!(service = %service.name, url = %url, error = %error, "dispatch failed");
                return DownstreamReply::synthetic(classify(&error), &error.to_string());
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(body) => DownstreamReply::new(status, headers, body),
            Err(error) => {
                warn!(service = %service.name, url = %url, error = %error, "body read failed");
                DownstreamReply::synthetic(classify(&error), &error.to_string())
            }
        }
    }
}

/// Map a client error onto the synthetic reply status: 504 for timeouts,
/// 502 for transport problems, 500 for anything else.
fn classify(error: &reqwest::Error) -> StatusCode {
    if error.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else if error.is_connect() || error.is_request() || error.is_body() || error.is_redirect() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
