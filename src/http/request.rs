//! Request handling and transformation.
//!
//! # Responsibilities
//! - Build the outbound request: backend URI, forwarded headers, header hygiene
//! - Decide whether the request body can be replayed on retry
//! - Hand out a fresh body for each attempt
//!
//! # Design Decisions
//! - The inbound request is never mutated; each attempt gets its own copy
//! - Bodies are buffered only when their declared length fits the replay limit;
//!   a body of unknown length is sent once and never replayed
//! - Outbound requests always speak HTTP/1.1 to the backend

use std::net::SocketAddr;

use axum::body::{Body, Bytes, HttpBody};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING, UPGRADE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri, Version};

use crate::error::ProxyError;
use crate::http::target::BackendTarget;
use crate::security::headers::{set_forwarded_headers, strip_hop_by_hop};

/// Method, URI and headers of the request as the backend will see it.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    /// Rewrite inbound request parts for the backend.
    pub fn from_parts(
        parts: &Parts,
        target: &BackendTarget,
        client_addr: Option<SocketAddr>,
    ) -> Result<Self, ProxyError> {
        let mut headers = parts.headers.clone();
        // Strip first: `Connection` may name headers the proxy is about to set.
        strip_hop_by_hop(&mut headers);
        set_forwarded_headers(
            &mut headers,
            &parts.uri,
            client_addr,
            target.authority().as_str(),
        );

        Ok(Self {
            method: parts.method.clone(),
            uri: target.rewrite(&parts.uri)?,
            headers,
        })
    }

    /// Restore the upgrade handshake headers after hop-by-hop stripping.
    pub fn with_websocket_upgrade(mut self) -> Self {
        self.headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        self.headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        self
    }

    /// Materialize one attempt.
    pub fn to_request(&self, body: Body) -> Result<Request<Body>, ProxyError> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.uri.clone())
            .version(Version::HTTP_11);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(builder.body(body)?)
    }
}

/// The inbound headers that describe body framing, kept before hop-by-hop
/// removal drops `Transfer-Encoding`.
pub fn body_framing(headers: &HeaderMap) -> HeaderMap {
    let mut framing = HeaderMap::new();
    for name in [CONTENT_LENGTH, TRANSFER_ENCODING] {
        for value in headers.get_all(&name) {
            framing.append(name.clone(), value.clone());
        }
    }
    framing
}

/// Methods that conventionally carry a request body.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Request body of a buffered exchange, with its replay capability.
#[derive(Debug)]
pub enum ReplayableBody {
    /// No body at all; trivially replayable.
    Empty,
    /// Fully buffered; every attempt gets a cheap clone.
    Buffered(Bytes),
    /// Streamed straight through; usable for exactly one attempt.
    OneShot(Option<Body>),
}

impl ReplayableBody {
    /// Inspect the inbound body and buffer it when its declared size allows.
    pub async fn capture(
        headers: &HeaderMap,
        body: Body,
        replay_limit: usize,
    ) -> Result<Self, ProxyError> {
        let chunked = headers.contains_key(TRANSFER_ENCODING);
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());

        if body.is_end_stream() {
            return Ok(ReplayableBody::Empty);
        }

        match declared {
            Some(len) if !chunked && len <= replay_limit => {
                let bytes = axum::body::to_bytes(body, replay_limit)
                    .await
                    .map_err(ProxyError::RequestBody)?;
                Ok(ReplayableBody::Buffered(bytes))
            }
            _ => Ok(ReplayableBody::OneShot(Some(body))),
        }
    }

    pub fn is_replayable(&self) -> bool {
        !matches!(self, ReplayableBody::OneShot(_))
    }

    /// Body for the next attempt. Fails once a one-shot body has been used.
    pub fn next_body(&mut self) -> Result<Body, ProxyError> {
        match self {
            ReplayableBody::Empty => Ok(Body::empty()),
            ReplayableBody::Buffered(bytes) => Ok(Body::from(bytes.clone())),
            ReplayableBody::OneShot(body) => body.take().ok_or(ProxyError::BodyReplay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{HOST, PROXY_AUTHORIZATION, TE};
    use axum::http::Request;

    fn target() -> BackendTarget {
        BackendTarget::from_config(&crate::config::BackendConfig {
            scheme: "http".into(),
            host: "127.0.0.1".into(),
            port: 3000,
        })
        .unwrap()
    }

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn outbound_request_is_rewritten() {
        let inbound = parts(
            Request::builder()
                .method(Method::POST)
                .uri("/mcp?x=1")
                .header(HOST, "proxy.example.com")
                .header(CONNECTION, "keep-alive")
                .header(TE, "trailers")
                .header(PROXY_AUTHORIZATION, "Basic Zm9v")
                .header("x-user-id", "alice")
                .body(())
                .unwrap(),
        );

        let outbound = OutboundRequest::from_parts(&inbound, &target(), None).unwrap();

        assert_eq!(outbound.uri.to_string(), "http://127.0.0.1:3000/mcp?x=1");
        assert_eq!(outbound.headers[HOST], "proxy.example.com");
        assert_eq!(outbound.headers["x-forwarded-host"], "proxy.example.com");
        assert_eq!(outbound.headers["x-user-id"], "alice");
        assert!(outbound.headers.get(CONNECTION).is_none());
        assert!(outbound.headers.get(TE).is_none());
        assert!(outbound.headers.get(PROXY_AUTHORIZATION).is_none());
    }

    #[test]
    fn connection_tokens_cannot_remove_forwarded_headers() {
        let inbound = parts(
            Request::builder()
                .uri("/mcp")
                .header(HOST, "proxy.example.com")
                .header(CONNECTION, "X-Forwarded-Host, X-Forwarded-Proto")
                .header("x-forwarded-host", "spoofed.example")
                .body(())
                .unwrap(),
        );

        let outbound = OutboundRequest::from_parts(&inbound, &target(), None).unwrap();

        assert_eq!(outbound.headers["x-forwarded-host"], "proxy.example.com");
        assert_eq!(outbound.headers["x-forwarded-proto"], "http");
        assert!(outbound.headers.get(CONNECTION).is_none());
    }

    #[test]
    fn websocket_upgrade_headers_survive() {
        let inbound = parts(
            Request::builder()
                .uri("/ws")
                .header(CONNECTION, "Upgrade")
                .header(UPGRADE, "websocket")
                .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                .body(())
                .unwrap(),
        );

        let outbound = OutboundRequest::from_parts(&inbound, &target(), None)
            .unwrap()
            .with_websocket_upgrade();
        let request = outbound.to_request(Body::empty()).unwrap();

        assert_eq!(request.headers()[UPGRADE], "websocket");
        assert_eq!(request.headers()[CONNECTION], "Upgrade");
        assert!(request.headers().contains_key("sec-websocket-key"));
        assert_eq!(request.version(), Version::HTTP_11);
    }

    #[test]
    fn body_framing_keeps_transfer_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-other", HeaderValue::from_static("1"));

        let framing = body_framing(&headers);
        assert_eq!(framing[TRANSFER_ENCODING], "chunked");
        assert_eq!(framing.len(), 1);
    }

    #[tokio::test]
    async fn declared_body_is_buffered_and_replayed() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));

        let mut body = ReplayableBody::capture(&headers, Body::from("hello"), 1024)
            .await
            .unwrap();
        assert!(body.is_replayable());

        for _ in 0..2 {
            let bytes = axum::body::to_bytes(body.next_body().unwrap(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&bytes[..], b"hello");
        }
    }

    #[tokio::test]
    async fn oversized_or_chunked_body_is_one_shot() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        let mut body = ReplayableBody::capture(&headers, Body::from("hello"), 4)
            .await
            .unwrap();
        assert!(!body.is_replayable());
        assert!(body.next_body().is_ok());
        assert!(matches!(body.next_body(), Err(ProxyError::BodyReplay)));

        let mut headers = HeaderMap::new();
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        let body = ReplayableBody::capture(&headers, Body::from("hello"), 1024)
            .await
            .unwrap();
        assert!(!body.is_replayable());
    }

    #[tokio::test]
    async fn no_declared_body_is_empty() {
        let body = ReplayableBody::capture(&HeaderMap::new(), Body::empty(), 1024)
            .await
            .unwrap();
        assert!(matches!(body, ReplayableBody::Empty));
    }

    #[test]
    fn body_methods() {
        assert!(carries_body(&Method::POST));
        assert!(carries_body(&Method::PATCH));
        assert!(!carries_body(&Method::DELETE));
    }
}
