// SPDX-License-Identifier: MIT
//! JSON-RPC 2.0 server over a local WebSocket.
//!
//! One connection per client, one tokio task per connection. Every request
//! passes the auth gate before its method is even looked up; handler errors
//! are classified into RPC codes exactly once, here.

pub mod auth;
pub mod handlers;

use crate::store::StoreError;
use crate::AppContext;
use anyhow::Result;
use auth::AuthError;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
    /// Per-call credential in `Bearer <secret>` form.
    auth: Option<String>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

// ─── Error codes ─────────────────────────────────────────────────────────────
//
// Standard JSON-RPC codes plus the application classifications mirrored by
// the client in cli::client::RpcFailure.

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
/// Malformed or missing required input. Never retried.
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Missing or blank credential. Never retried.
pub const UNAUTHENTICATED: i32 = -32001;
/// Credential present but wrong. Never retried.
pub const PERMISSION_DENIED: i32 = -32002;
/// Referenced task id does not exist. Never retried.
pub const NOT_FOUND: i32 = -32003;
/// Explicit-id creation collided with an existing task. Never retried.
pub const ALREADY_EXISTS: i32 = -32004;
/// Transient backend condition — the only code eligible for automatic retry.
pub const UNAVAILABLE: i32 = -32005;
/// Call abandoned by the caller's deadline. Assigned client-side; the server
/// never emits it (store operations are fast once the lock is held).
pub const DEADLINE_EXCEEDED: i32 = -32006;

/// Human-readable name for an RPC error code, for client-side reporting.
pub fn code_name(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "ParseError",
        INVALID_REQUEST => "InvalidRequest",
        METHOD_NOT_FOUND => "MethodNotFound",
        INVALID_PARAMS => "InvalidArgument",
        INTERNAL_ERROR => "Internal",
        UNAUTHENTICATED => "Unauthenticated",
        PERMISSION_DENIED => "PermissionDenied",
        NOT_FOUND => "NotFound",
        ALREADY_EXISTS => "AlreadyExists",
        UNAVAILABLE => "Unavailable",
        DEADLINE_EXCEEDED => "DeadlineExceeded",
        _ => "Unknown",
    }
}

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "RPC server listening (WebSocket + HTTP health on same port)");

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping RPC server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("RPC server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares one port for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so clients can check liveness without a WS library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": ctx.started_at.elapsed().as_secs(),
        "taskCount": ctx.store.count().await,
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from
    // WebSocket upgrades — both share the same port and both start with
    // "GET ". Only the exact /health path short-circuits; everything else
    // falls through to the WS handshake.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = dispatch_text(&text, &ctx).await;
                if let Err(e) = sink.send(Message::Text(response)).await {
                    warn!(err = %e, "send error");
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = sink.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(err = %e, "ws error");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) async fn dispatch_text(text: &str, ctx: &AppContext) -> String {
    // Parse
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    // Validate jsonrpc field
    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);

    // Auth gate: every method, before the method is even looked up.
    if let Err(e) = auth::authorize(req.auth.as_deref(), &ctx.auth_token) {
        let code = match e {
            AuthError::Unauthenticated => UNAUTHENTICATED,
            AuthError::PermissionDenied => PERMISSION_DENIED,
        };
        warn!(method = %req.method, code, "rejected unauthorized call");
        return error_response(id, code, &e.to_string());
    }

    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    match dispatch(&req.method, params, ctx).await {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => {
            let (code, msg) = classify_error(&e);
            error_response(id, code, &msg)
        }
    }
}

async fn dispatch(method: &str, params: Value, ctx: &AppContext) -> anyhow::Result<Value> {
    match method {
        "daemon.ping" => handlers::daemon::ping(params, ctx).await,
        "daemon.status" => handlers::daemon::status(params, ctx).await,
        "daemon.greet" => handlers::daemon::greet(params, ctx).await,
        "task.create" => handlers::task::create(params, ctx).await,
        "task.createWithId" => handlers::task::create_with_id(params, ctx).await,
        "task.get" => handlers::task::get(params, ctx).await,
        "task.list" => handlers::task::list(params, ctx).await,
        "task.failNext" => handlers::task::fail_next(params, ctx).await,
        _ => Err(anyhow::anyhow!("METHOD_NOT_FOUND:{}", method)),
    }
}

/// Map a handler failure to an RPC code, exactly once.
///
/// Domain errors carry their classification as a typed [`StoreError`]; the
/// string fallbacks cover the method-not-found sentinel and serde's param
/// deserialization messages.
fn classify_error(e: &anyhow::Error) -> (i32, String) {
    if let Some(store_err) = e.downcast_ref::<StoreError>() {
        let code = match store_err {
            StoreError::InvalidArgument(_) => INVALID_PARAMS,
            StoreError::NotFound(_) => NOT_FOUND,
            StoreError::AlreadyExists(_) => ALREADY_EXISTS,
            StoreError::Unavailable(_) => UNAVAILABLE,
        };
        return (code, store_err.to_string());
    }
    let msg = e.to_string();
    if msg.starts_with("METHOD_NOT_FOUND:") {
        return (METHOD_NOT_FOUND, "Method not found".to_string());
    }
    if msg.contains("missing field") || msg.contains("invalid type") {
        return (INVALID_PARAMS, format!("Invalid params: {}", msg));
    }
    error!(err = %e, "internal error");
    (INTERNAL_ERROR, "Internal error".to_string())
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}
