//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Forward the upgrade handshake to the backend
//! - Answer the client with the backend's 101 status and headers; hyper
//!   serializes that response itself, so the status line is not the
//!   backend's bytes verbatim
//! - Take over both connections and copy bytes in both directions
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Proxy ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level relay after the handshake; frames are never parsed
//! - Each direction is its own task; the first to finish tears both down
//! - Nothing after the handshake feeds the circuit breaker

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::ProxyError;
use crate::observability::metrics;

/// Send the handshake upstream and, on `101`, start the relay.
///
/// A backend that declines the upgrade has its response passed through
/// untouched.
pub async fn forward_websocket(
    client: &Client<HttpConnector, Body>,
    client_upgrade: OnUpgrade,
    request: Request<Body>,
    backend: String,
) -> Result<Response<Body>, ProxyError> {
    let mut response = client.request(request).await?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        tracing::warn!(status = %response.status(), "Backend declined WebSocket upgrade");
        let (parts, body) = response.into_parts();
        return Ok(Response::from_parts(parts, Body::new(body)));
    }

    let backend_upgrade = hyper::upgrade::on(&mut response);
    let (parts, _) = response.into_parts();

    tokio::spawn(async move {
        let (client_io, backend_io) = match tokio::try_join!(client_upgrade, backend_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket takeover failed");
                metrics::record_streaming_error("upgrade", &backend);
                return;
            }
        };
        relay(TokioIo::new(client_io), TokioIo::new(backend_io), &backend).await;
    });

    Ok(Response::from_parts(parts, Body::empty()))
}

/// Copy bytes both ways until either side finishes, then close both.
pub async fn relay<C, B>(client: C, backend_io: B, backend: &str)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend_io);

    let mut upstream = tokio::spawn(async move {
        let copied = tokio::io::copy(&mut client_read, &mut backend_write).await;
        let _ = backend_write.shutdown().await;
        copied
    });
    let mut downstream = tokio::spawn(async move {
        let copied = tokio::io::copy(&mut backend_read, &mut client_write).await;
        let _ = client_write.shutdown().await;
        copied
    });

    let (direction, result) = tokio::select! {
        r = &mut upstream => ("client_to_backend", r),
        r = &mut downstream => ("backend_to_client", r),
    };
    upstream.abort();
    downstream.abort();

    match result {
        Ok(Ok(bytes)) => {
            tracing::debug!(direction, bytes, "WebSocket session closed");
        }
        Ok(Err(e)) => {
            tracing::warn!(direction, error = %e, "WebSocket relay failed");
            metrics::record_streaming_error("relay", backend);
        }
        Err(e) => {
            tracing::warn!(direction, error = %e, "WebSocket relay task failed");
            metrics::record_streaming_error("relay", backend);
        }
    }
}
