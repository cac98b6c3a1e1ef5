//! Response handling and transformation.
//!
//! # Responsibilities
//! - Capture one backend attempt into a private snapshot
//! - Commit the chosen snapshot to the client, hop-by-hop headers removed
//! - Map proxy failures to client-facing error responses
//!
//! # Design Decisions
//! - A snapshot is a value separate from the client response; nothing reaches
//!   the client until the retry loop has decided which attempt wins
//! - Head is write-once per attempt, like headers that are already on the wire

use axum::body::Body;
use axum::http::{HeaderMap, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::BytesMut;
use futures_util::StreamExt;
use hyper::body::Incoming;

use crate::error::ProxyError;
use crate::security::headers::strip_hop_by_hop;

/// Status, headers and body of one attempt, held back from the client.
#[derive(Debug)]
pub struct ResponseSnapshot {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    head_written: bool,
}

impl Default for ResponseSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSnapshot {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            head_written: false,
        }
    }

    /// Fix status and headers. Only the first call per snapshot has effect.
    pub fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> bool {
        if self.head_written {
            return false;
        }
        self.status = status;
        self.headers = headers;
        self.head_written = true;
        true
    }

    /// Append body bytes; an unwritten head becomes `200 OK`.
    pub fn write(&mut self, chunk: &[u8]) {
        if !self.head_written {
            self.write_head(StatusCode::OK, HeaderMap::new());
        }
        self.body.extend_from_slice(chunk);
    }

    /// Drain a backend response into a fresh snapshot.
    pub async fn capture(response: Response<Incoming>) -> Result<Self, ProxyError> {
        let (parts, body) = response.into_parts();
        let mut snapshot = Self::new();
        snapshot.write_head(parts.status, parts.headers);

        let mut data = Body::new(body).into_data_stream();
        while let Some(chunk) = data.next().await {
            snapshot.write(&chunk.map_err(ProxyError::UpstreamBody)?);
        }
        Ok(snapshot)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Commit the snapshot as the client-facing response.
    pub fn into_response(self) -> Response<Body> {
        let mut headers = self.headers;
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from(self.body.freeze()));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

/// Plain-text response for a proxy-generated status.
pub fn error_response(status: StatusCode, message: &'static str) -> Response<Body> {
    (status, message).into_response()
}
