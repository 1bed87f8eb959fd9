use crate::store::StoreError;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": ctx.started_at.elapsed().as_secs(),
        "taskCount": ctx.store.count().await,
        "port": ctx.config.port,
    }))
}

#[derive(Deserialize)]
struct GreetParams {
    name: String,
}

/// Greeting with a fixed artificial delay.
///
/// The server always waits the full delay before answering; callers impose
/// their own deadline and stop waiting when it fires.
pub async fn greet(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: GreetParams = serde_json::from_value(params)?;
    let name = p.name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidArgument("name is required".to_string()).into());
    }
    tokio::time::sleep(std::time::Duration::from_millis(ctx.config.greet_delay_ms)).await;
    Ok(json!({ "message": format!("Hello, {name} 👋") }))
}
