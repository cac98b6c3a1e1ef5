//! End-to-end tests for SSE and WebSocket pass-through.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use mcp_auth_proxy::HttpServer;
use tokio_tungstenite::tungstenite::Message;

mod common;

#[tokio::test]
async fn test_sse_events_arrive_in_order() {
    let events: Vec<String> = (1..=5).map(|i| format!("event-{}", i)).collect();
    let backend = common::start_sse_backend(events, Duration::from_millis(20)).await;
    let proxy = common::spawn_proxy(common::proxy_config(backend.addr)).await;

    let res = common::client()
        .get(proxy.url("/mcp/sse"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/event-stream");
    let body = res.text().await.unwrap();
    let expected: String = (1..=5).map(|i| format!("data: event-{}\n\n", i)).collect();
    assert_eq!(body, expected);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_sse_first_event_is_not_held_back() {
    let events = vec!["first".to_string(), "second".to_string()];
    let backend = common::start_sse_backend(events, Duration::from_millis(1500)).await;
    let proxy = common::spawn_proxy(common::proxy_config(backend.addr)).await;

    let started = Instant::now();
    let res = common::client()
        .get(proxy.url("/events"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    let mut stream = res.bytes_stream();
    let first = stream.next().await.unwrap().unwrap();

    assert!(String::from_utf8_lossy(&first).contains("data: first"));
    assert!(
        started.elapsed() < Duration::from_millis(1000),
        "First frame should be relayed before the backend finishes"
    );
}

#[tokio::test]
async fn test_sse_outlives_request_timeout() {
    let events: Vec<String> = (0..4).map(|i| i.to_string()).collect();
    let backend = common::start_sse_backend(events, Duration::from_millis(400)).await;
    let mut config = common::proxy_config(backend.addr);
    config.timeouts.request_secs = 1;
    let proxy = common::spawn_proxy(config).await;

    let res = common::client()
        .get(proxy.url("/events"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    let body = res.text().await.unwrap();

    assert_eq!(body.matches("data: ").count(), 4);
}

#[tokio::test]
async fn test_sse_stream_is_never_retried() {
    let backend = common::start_fixed_backend(503, "busy").await;
    let proxy = common::spawn_proxy(common::proxy_config(backend.addr)).await;

    let res = common::client()
        .get(proxy.url("/events"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_sse_server_error_counts_against_breaker() {
    let backend = common::start_fixed_backend(502, "").await;
    let server = HttpServer::new(common::proxy_config(backend.addr)).unwrap();
    let proxy_core = server.proxy().clone();
    let proxy = common::spawn_server(server).await;

    let res = common::client()
        .get(proxy.url("/events"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(proxy_core.breaker().failures(), 1);
}

#[tokio::test]
async fn test_sse_connect_failure_counts_against_breaker() {
    let addr = common::unreachable_addr().await;
    let server = HttpServer::new(common::proxy_config(addr)).unwrap();
    let proxy_core = server.proxy().clone();
    let proxy = common::spawn_server(server).await;

    let res = common::client()
        .get(proxy.url("/events"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(proxy_core.breaker().failures(), 1);
}

#[tokio::test]
async fn test_sse_cut_mid_stream_leaves_breaker_alone() {
    let backend = common::start_truncating_sse_backend().await;
    let mut config = common::proxy_config(backend.addr);
    config.circuit_breaker.threshold = 1;
    let server = HttpServer::new(config).unwrap();
    let proxy_core = server.proxy().clone();
    let proxy = common::spawn_server(server).await;

    let res = common::client()
        .get(proxy.url("/events"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let mut received = Vec::new();
    let mut stream = res.bytes_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        received.extend_from_slice(&chunk);
    }

    assert!(String::from_utf8_lossy(&received).contains("data: partial"));
    assert_eq!(proxy_core.breaker().state().to_string(), "closed");
    assert_eq!(proxy_core.breaker().failures(), 0);
}

#[tokio::test]
async fn test_open_breaker_rejects_streams_without_backend_call() {
    let backend = common::start_fixed_backend(500, "down").await;
    let mut config = common::proxy_config(backend.addr);
    config.retries.max_attempts = 1;
    config.circuit_breaker.threshold = 1;
    let server = HttpServer::new(config).unwrap();
    let proxy_core = server.proxy().clone();
    let proxy = common::spawn_server(server).await;
    let client = common::client();

    let res = client.get(proxy.url("/mcp")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(proxy_core.breaker().state().to_string(), "open");

    let res = client
        .get(proxy.url("/events"))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "Service Unavailable");

    let result = tokio_tungstenite::connect_async(format!("ws://{}/ws", proxy.addr)).await;
    assert!(result.is_err());

    assert_eq!(backend.calls(), 1, "Open breaker must not reach the backend");
    assert_eq!(proxy_core.breaker().failures(), 1);
}

#[tokio::test]
async fn test_websocket_echo() {
    let backend = common::start_websocket_echo_backend().await;
    let proxy = common::spawn_proxy(common::proxy_config(backend)).await;

    let (mut ws, response) = tokio_tungstenite::connect_async(format!("ws://{}/ws", proxy.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 101);

    ws.send(Message::text("hello")).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "hello");

    ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.into_data().to_vec(), vec![1u8, 2, 3]);

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_websocket_to_unreachable_backend_fails_handshake() {
    let addr = common::unreachable_addr().await;
    let server = HttpServer::new(common::proxy_config(addr)).unwrap();
    let proxy_core = server.proxy().clone();
    let proxy = common::spawn_server(server).await;

    let result = tokio_tungstenite::connect_async(format!("ws://{}/ws", proxy.addr)).await;

    assert!(result.is_err());
    assert_eq!(proxy_core.breaker().failures(), 1);
}
