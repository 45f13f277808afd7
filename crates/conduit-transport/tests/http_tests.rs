//! HTTP transport tests against hand-rolled socket fixtures.
//!
//! Each test stands up a `TcpListener`, speaks just enough HTTP/1.1 for
//! reqwest to be happy, and drives the transports through their real wire
//! paths: endpoint discovery on the legacy flavour, JSON and SSE response
//! legs on the streamable flavour, and the 404-triggered fallback swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

use conduit_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, RequestId};
use conduit_protocol::Error;
use conduit_transport::{
    AutoHttpTransport, HttpSseConfig, HttpSseTransport, StreamableHttpConfig,
    StreamableHttpTransport, Transport,
};

async fn read_request(stream: &mut TcpStream) -> (String, String) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let header_end = pos + 4;
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = headers
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            let mut body = buf[header_end..].to_vec();
            while body.len() < content_length {
                let m = stream.read(&mut tmp).await.unwrap();
                if m == 0 {
                    break;
                }
                body.extend_from_slice(&tmp[..m]);
            }
            let body = String::from_utf8_lossy(&body[..content_length]).to_string();
            return (headers, body);
        }
    }
    (String::new(), String::new())
}

async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: Option<&str>,
    extra_headers: &[(&str, &str)],
    body: &str,
) {
    let mut response = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    if let Some(ct) = content_type {
        response.push_str(&format!("Content-Type: {ct}\r\n"));
    }
    for (key, value) in extra_headers {
        response.push_str(&format!("{key}: {value}\r\n"));
    }
    response.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    stream.write_all(response.as_bytes()).await.unwrap();
}

async fn write_sse_headers(stream: &mut TcpStream) {
    stream
        .write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
}

fn request_path(headers: &str) -> String {
    headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("")
        .to_string()
}

fn ping_request(id: &str) -> JsonRpcMessage {
    JsonRpcMessage::Request(JsonRpcRequest::new("ping", None, RequestId::from(id)))
}

fn initialize_request(id: &str) -> JsonRpcMessage {
    JsonRpcMessage::Request(JsonRpcRequest::new(
        "initialize",
        Some(json!({"protocolVersion": "2025-03-26"})),
        RequestId::from(id),
    ))
}

/// Legacy flavour: the endpoint event names the POST URL, and responses to
/// POSTed requests arrive over the long-lived SSE stream.
#[tokio::test]
async fn http_sse_discovers_endpoint_and_routes_responses() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frame_tx, frame_rx) = mpsc::channel::<String>(8);
    let frame_rx = Arc::new(Mutex::new(Some(frame_rx)));

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (headers, body) = read_request(&mut stream).await;
            if headers.starts_with("GET") {
                let rx = frame_rx.lock().await.take();
                tokio::spawn(async move {
                    write_sse_headers(&mut stream).await;
                    stream
                        .write_all(b"event: endpoint\ndata: /messages\n\n")
                        .await
                        .unwrap();
                    let mut rx = rx.expect("only one SSE stream expected");
                    while let Some(frame) = rx.recv().await {
                        stream.write_all(frame.as_bytes()).await.unwrap();
                    }
                });
            } else {
                assert_eq!(request_path(&headers), "/messages");
                let request: Value = serde_json::from_str(&body).unwrap();
                let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": {"ok": true}});
                frame_tx
                    .send(format!("id: evt-1\ndata: {reply}\n\n"))
                    .await
                    .unwrap();
                write_response(&mut stream, "202 Accepted", None, &[], "").await;
            }
        }
    });

    let transport = HttpSseTransport::new(HttpSseConfig::new(format!("http://{addr}/sse")));
    transport.connect().await.unwrap();

    transport.send(ping_request("p-1")).await.unwrap();
    let message = transport.receive().await.unwrap().unwrap();
    match message {
        JsonRpcMessage::Response(r) => {
            assert_eq!(r.id.as_request_id(), Some(&RequestId::from("p-1")));
            assert_eq!(r.result().unwrap()["ok"], json!(true));
        }
        other => panic!("expected response, got {other:?}"),
    }
    assert_eq!(transport.last_event_id().await.as_deref(), Some("evt-1"));

    transport.close().await.unwrap();
    transport.close().await.unwrap();
}

/// Streamable flavour: a 200 JSON response is delivered through the receive
/// channel and the session id from `initialize` rides on later requests.
#[tokio::test]
async fn streamable_http_json_response_and_session_header() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen_session_header = Arc::new(AtomicBool::new(false));
    let seen = seen_session_header.clone();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (headers, body) = read_request(&mut stream).await;
            if body.is_empty() {
                // Session DELETE on close; nothing to answer.
                continue;
            }
            let request: Value = serde_json::from_str(&body).unwrap();
            match request["method"].as_str().unwrap() {
                "initialize" => {
                    let reply =
                        json!({"jsonrpc": "2.0", "id": request["id"], "result": {"protocolVersion": "2025-03-26"}});
                    write_response(
                        &mut stream,
                        "200 OK",
                        Some("application/json"),
                        &[("Mcp-Session-Id", "sess-42")],
                        &reply.to_string(),
                    )
                    .await;
                }
                "ping" => {
                    if headers.to_ascii_lowercase().contains("mcp-session-id: sess-42") {
                        seen.store(true, Ordering::SeqCst);
                    }
                    let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": {}});
                    write_response(
                        &mut stream,
                        "200 OK",
                        Some("application/json"),
                        &[],
                        &reply.to_string(),
                    )
                    .await;
                }
                other => panic!("unexpected method {other}"),
            }
        }
    });

    let transport =
        StreamableHttpTransport::new(StreamableHttpConfig::new(format!("http://{addr}/mcp")));
    transport.connect().await.unwrap();

    transport.send(initialize_request("i-1")).await.unwrap();
    let reply = transport.receive().await.unwrap().unwrap();
    assert!(matches!(reply, JsonRpcMessage::Response(_)));
    assert_eq!(transport.session_id().await.as_deref(), Some("sess-42"));

    transport.send(ping_request("p-1")).await.unwrap();
    transport.receive().await.unwrap().unwrap();
    assert!(seen_session_header.load(Ordering::SeqCst));

    transport.close().await.unwrap();
}

/// Streamable flavour: a 200 `text/event-stream` response streams any number
/// of messages into the shared receive channel.
#[tokio::test]
async fn streamable_http_sse_upgrade_streams_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (_, body) = read_request(&mut stream).await;
        let request: Value = serde_json::from_str(&body).unwrap();
        write_sse_headers(&mut stream).await;
        let progress =
            json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {"progress": 0.5, "progressToken": "t"}});
        let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": {}});
        stream
            .write_all(format!("data: {progress}\n\ndata: {reply}\n\n").as_bytes())
            .await
            .unwrap();
    });

    let transport =
        StreamableHttpTransport::new(StreamableHttpConfig::new(format!("http://{addr}/mcp")));
    transport.connect().await.unwrap();
    transport.send(ping_request("p-9")).await.unwrap();

    let first = transport.receive().await.unwrap().unwrap();
    assert_eq!(first.method(), Some("notifications/progress"));
    let second = transport.receive().await.unwrap().unwrap();
    assert!(matches!(second, JsonRpcMessage::Response(_)));

    transport.close().await.unwrap();
}

/// Error classification on the streamable flavour.
#[tokio::test]
async fn streamable_http_classifies_auth_and_rate_limit_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for status in ["401 Unauthorized", "429 Too Many Requests"] {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut stream).await;
            let extra: &[(&str, &str)] = if status.starts_with("429") {
                &[("Retry-After", "7")]
            } else {
                &[]
            };
            write_response(&mut stream, status, None, extra, "").await;
        }
    });

    let transport =
        StreamableHttpTransport::new(StreamableHttpConfig::new(format!("http://{addr}/mcp")));
    transport.connect().await.unwrap();

    let err = transport.send(ping_request("p-1")).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));

    let err = transport.send(ping_request("p-2")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::RateLimited { retry_after: Some(7), .. }
    ));

    transport.close().await.unwrap();
}

/// A 404 on a non-initialize request is a plain transport error, not the
/// fallback sentinel.
#[tokio::test]
async fn streamable_http_404_outside_initialize_is_not_the_sentinel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut stream).await;
        write_response(&mut stream, "404 Not Found", None, &[], "").await;
    });

    let transport =
        StreamableHttpTransport::new(StreamableHttpConfig::new(format!("http://{addr}/mcp")));
    transport.connect().await.unwrap();
    let err = transport.send(ping_request("p-1")).await.unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
    transport.close().await.unwrap();
}

/// The auto transport falls back to HTTP+SSE when `initialize` is met with
/// 404, retries the send, and succeeds against an endpoint-event server.
#[tokio::test]
async fn auto_transport_falls_back_to_legacy_sse() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frame_tx, frame_rx) = mpsc::channel::<String>(8);
    let frame_rx = Arc::new(Mutex::new(Some(frame_rx)));

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (headers, body) = read_request(&mut stream).await;
            let path = request_path(&headers);
            if headers.starts_with("GET") {
                let rx = frame_rx.lock().await.take();
                tokio::spawn(async move {
                    write_sse_headers(&mut stream).await;
                    stream
                        .write_all(b"event: endpoint\ndata: /messages\n\n")
                        .await
                        .unwrap();
                    let mut rx = rx.expect("only one SSE stream expected");
                    while let Some(frame) = rx.recv().await {
                        stream.write_all(frame.as_bytes()).await.unwrap();
                    }
                });
            } else if path == "/mcp" {
                // The modern flavour is not served here.
                write_response(&mut stream, "404 Not Found", None, &[], "").await;
            } else {
                assert_eq!(path, "/messages");
                let request: Value = serde_json::from_str(&body).unwrap();
                let reply = json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "result": {"protocolVersion": "2024-11-05"}
                });
                frame_tx.send(format!("data: {reply}\n\n")).await.unwrap();
                write_response(&mut stream, "202 Accepted", None, &[], "").await;
            }
        }
    });

    let transport = AutoHttpTransport::new(StreamableHttpConfig::new(format!("http://{addr}/mcp")));
    transport.connect().await.unwrap();

    transport.send(initialize_request("i-7")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(10), transport.receive())
        .await
        .expect("receive should complete")
        .unwrap()
        .unwrap();
    match reply {
        JsonRpcMessage::Response(r) => {
            assert_eq!(r.id.as_request_id(), Some(&RequestId::from("i-7")));
            assert_eq!(r.result().unwrap()["protocolVersion"], json!("2024-11-05"));
        }
        other => panic!("expected response, got {other:?}"),
    }

    transport.close().await.unwrap();
}
