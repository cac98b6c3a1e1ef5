//! Streaming detection and Server-Sent Events pass-through.
//!
//! # Responsibilities
//! - Classify a request as buffered or streaming, once, before dispatch
//! - Relay SSE responses line by line without buffering or timeouts
//!
//! # Data Flow
//! ```text
//! Backend ──chunks──▶ line splitter ──one frame per line──▶ Client
//! ```
//!
//! # Design Decisions
//! - Every `\n`-terminated line becomes its own body frame, so hyper flushes
//!   it before the next backend read
//! - Mid-stream failures end the stream quietly; the response head is gone

use std::io;
use std::pin::Pin;

use axum::body::Body;
use axum::http::header::{ACCEPT, CONNECTION, UPGRADE};
use axum::http::{HeaderMap, Request, Response};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::error::ProxyError;
use crate::observability::metrics;
use crate::security::headers::strip_hop_by_hop;

pub type LineStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

/// Kind of long-lived exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Sse,
    WebSocket,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Sse => "sse",
            StreamKind::WebSocket => "websocket",
        }
    }
}

/// Which of the two disjoint proxy paths a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Buffered,
    Stream(StreamKind),
}

/// Decide the dispatch path from the inbound request headers.
pub fn classify(headers: &HeaderMap) -> Dispatch {
    let wants_event_stream = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/event-stream"));
    if wants_event_stream {
        return Dispatch::Stream(StreamKind::Sse);
    }

    let connection_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("upgrade"));
    let websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if connection_upgrade && websocket {
        return Dispatch::Stream(StreamKind::WebSocket);
    }

    Dispatch::Buffered
}

/// Open the event stream on the backend and relay it.
///
/// Only the connect step can fail; the returned response carries the
/// backend's status and headers verbatim.
pub async fn forward_sse(
    client: &Client<HttpConnector, Body>,
    request: Request<Body>,
    backend: String,
) -> Result<Response<Body>, ProxyError> {
    let response = client.request(request).await?;
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    tracing::debug!(status = %parts.status, "Event stream opened");
    Ok(Response::from_parts(
        parts,
        Body::from_stream(line_stream(body, backend)),
    ))
}

/// Re-chunk the backend body on line boundaries.
pub fn line_stream(body: Incoming, backend: String) -> LineStream {
    Box::pin(async_stream::stream! {
        let mut frames = Body::new(body).into_data_stream();
        let mut buffer = BytesMut::new();

        loop {
            match frames.next().await {
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(&chunk);
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        yield Ok(buffer.split_to(pos + 1).freeze());
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(backend = %backend, error = %e, "Event stream broke off");
                    metrics::record_streaming_error("read", &backend);
                    break;
                }
                None => {
                    if !buffer.is_empty() {
                        yield Ok(buffer.split().freeze());
                    }
                    tracing::debug!(backend = %backend, "Event stream ended");
                    break;
                }
            }
        }
    })
}
