//! Aggregate response assembly.
//!
//! Downstream replies accumulate here as named parts and serialize to a
//! `multipart/mixed` body. Each part embeds the downstream call's complete
//! HTTP response: status line, headers, blank line, body. Part order on the
//! wire is insertion order.

use bytes::Bytes;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};
use uuid::Uuid;

use super::error::EngineError;

/// Chunk name used when a part is inserted without one.
pub const DEFAULT_CHUNK_NAME: &str = "default";

/// Diagnostic header carried by synthetic replies.
pub const ERROR_HEADER: &str = "x-routerd-error";

/// A fully buffered downstream HTTP response, real or synthesized.
#[derive(Debug, Clone)]
pub struct DownstreamReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DownstreamReply {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a stand-in reply for a failed dispatch: empty body, the error
    /// text in the diagnostic header.
    pub fn synthetic(status: StatusCode, error: &str) -> Self {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(error)
            .unwrap_or_else(|_| HeaderValue::from_static("dispatch error"));
        headers.insert(HeaderName::from_static(ERROR_HEADER), value);

        Self {
            status,
            headers,
            body: Bytes::new(),
        }
    }

    /// True when this reply was synthesized by the router rather than
    /// received from a downstream.
    pub fn is_synthetic(&self) -> bool {
        self.headers.contains_key(ERROR_HEADER)
    }
}

/// Ordered collection of named reply parts.
#[derive(Debug, Default)]
pub struct MultipartResponse {
    parts: Vec<(String, DownstreamReply)>,
}

impl MultipartResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a part. Chunk names are unique within a response.
    pub fn add_part(
        &mut self,
        name: impl Into<String>,
        reply: DownstreamReply,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(EngineError::DuplicatePart(name));
        }
        self.parts.push((name, reply));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&DownstreamReply> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, reply)| reply)
    }

    /// Part names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Serialize to wire form; returns the `Content-Type` value and the body.
    pub fn serialize(&self) -> (String, Bytes) {
        let boundary = format!("routerd-{}", Uuid::new_v4().simple());
        let content_type = format!("multipart/mixed; boundary={boundary}");

        let mut out: Vec<u8> = Vec::new();
        for (name, reply) in &self.parts {
            let name = if name.is_empty() {
                DEFAULT_CHUNK_NAME
            } else {
                name.as_str()
            };

            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            out.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );

            out.extend_from_slice(
                format!(
                    "HTTP/1.1 {} {}\r\n",
                    reply.status.as_u16(),
                    reply.status.canonical_reason().unwrap_or("")
                )
                .as_bytes(),
            );
            for (header, value) in &reply.headers {
                out.extend_from_slice(header.as_str().as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&reply.body);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        (content_type, Bytes::from(out))
    }
}
