// SPDX-License-Identifier: MIT
//! Lightweight JSON-RPC WebSocket client for CLI commands.
//!
//! CLI subcommands (`taskd task create`, `taskd status`, etc.) use this to
//! connect to the running daemon and call RPC methods with the shared-secret
//! credential attached to every request.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::ipc::{code_name, DEADLINE_EXCEEDED, INTERNAL_ERROR, UNAVAILABLE};

/// A failed RPC call, carrying its classification code.
///
/// Server-side failures carry the code from the response's `error` member;
/// transport failures classify as `Unavailable` and an expired deadline as
/// `DeadlineExceeded`, both assigned locally.
#[derive(Debug)]
pub struct RpcFailure {
    pub code: i32,
    pub message: String,
}

impl RpcFailure {
    /// Whether a retry may safely be attempted.
    pub fn is_transient(&self) -> bool {
        self.code == UNAVAILABLE
    }

    fn transport(message: impl Into<String>) -> Self {
        Self {
            code: UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", code_name(self.code), self.code, self.message)
    }
}

impl std::error::Error for RpcFailure {}

/// A short-lived WebSocket client for CLI-to-daemon RPC calls.
///
/// Each [`call_once`](DaemonClient::call_once) opens a fresh connection,
/// issues one authenticated call, and returns the result.
pub struct DaemonClient {
    url: String,
    token: String,
    timeout: Duration,
}

impl DaemonClient {
    /// Create a client targeting the daemon on the given port with the given
    /// shared secret.
    pub fn new(port: u16, token: String) -> Self {
        Self {
            url: format!("ws://127.0.0.1:{port}"),
            token,
            timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-call deadline (default: 5 s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect, issue one authenticated RPC call, and return the result.
    ///
    /// The whole call runs under the client deadline; expiry classifies as
    /// `DeadlineExceeded`. Nothing here retries — that is the caller's call.
    pub async fn call_once(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        match tokio::time::timeout(self.timeout, self.call_inner(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(RpcFailure {
                code: DEADLINE_EXCEEDED,
                message: format!(
                    "deadline of {:?} exceeded calling {method}",
                    self.timeout
                ),
            }),
        }
    }

    async fn call_inner(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let (mut ws, _) = connect_async(&self.url).await.map_err(|e| {
            RpcFailure::transport(format!("could not connect to daemon at {}: {e}", self.url))
        })?;

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "auth": format!("Bearer {}", self.token),
            "params": params,
        });
        ws.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| RpcFailure::transport(format!("send error: {e}")))?;

        // Read messages until we get the response with our id.
        loop {
            let msg = ws
                .next()
                .await
                .ok_or_else(|| RpcFailure::transport("connection closed before response"))?
                .map_err(|e| RpcFailure::transport(format!("receive error: {e}")))?;

            if let Message::Text(text) = msg {
                let v: Value = serde_json::from_str(&text).map_err(|e| RpcFailure {
                    code: INTERNAL_ERROR,
                    message: format!("malformed response from daemon: {e}"),
                })?;
                if v.get("id").and_then(Value::as_i64) != Some(1) {
                    continue;
                }
                if let Some(err) = v.get("error") {
                    return Err(RpcFailure {
                        code: err.get("code").and_then(Value::as_i64).unwrap_or(INTERNAL_ERROR as i64)
                            as i32,
                        message: err
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    });
                }
                return Ok(v.get("result").cloned().unwrap_or(Value::Null));
            }
        }
    }
}

/// Read the shared secret from the daemon's data directory.
///
/// Returns an error if the file does not exist (daemon not yet started).
pub fn read_auth_token(data_dir: &std::path::Path) -> anyhow::Result<String> {
    use anyhow::Context as _;

    let token_path = data_dir.join("auth_token");
    let token = std::fs::read_to_string(&token_path).with_context(|| {
        format!(
            "could not read auth token from {path}\n  Is the daemon running? Start it with `taskd serve` first.",
            path = token_path.display()
        )
    })?;
    Ok(token.trim().to_owned())
}
