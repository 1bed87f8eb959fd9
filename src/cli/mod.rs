// SPDX-License-Identifier: MIT
//! Client-side command implementations.
//!
//! Each function connects to a running daemon, issues one RPC, and prints
//! the outcome. Errors propagate to `main`, which reports the classification
//! and message on stderr and exits nonzero — no partial output on error.

pub mod client;

use anyhow::Result;
use serde_json::{json, Value};

use crate::retry::{retry_transient, RetryConfig};
use client::{DaemonClient, RpcFailure};

pub async fn ping(client: &DaemonClient) -> Result<()> {
    let result = client.call_once("daemon.ping", json!({})).await?;
    println!("pong: {}", result["pong"]);
    Ok(())
}

pub async fn status(client: &DaemonClient) -> Result<()> {
    let result = client.call_once("daemon.status", json!({})).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn greet(client: &DaemonClient, name: &str) -> Result<()> {
    let result = client.call_once("daemon.greet", json!({ "name": name })).await?;
    println!("{}", result["message"].as_str().unwrap_or_default());
    Ok(())
}

/// Create a task with a server-generated id, retrying through transient
/// daemon failures.
pub async fn task_create(client: &DaemonClient, title: &str, description: &str) -> Result<()> {
    let params = json!({ "title": title, "description": description });
    let task = retry_transient(
        &RetryConfig::default(),
        |e: &RpcFailure| e.is_transient(),
        || client.call_once("task.create", params.clone()),
    )
    .await?;
    print_task("created", &task);
    Ok(())
}

pub async fn task_create_with_id(
    client: &DaemonClient,
    id: &str,
    title: &str,
    description: &str,
) -> Result<()> {
    let params = json!({ "taskId": id, "title": title, "description": description });
    let task = client.call_once("task.createWithId", params).await?;
    print_task("created", &task);
    Ok(())
}

pub async fn task_get(client: &DaemonClient, id: &str) -> Result<()> {
    let task = client.call_once("task.get", json!({ "taskId": id })).await?;
    print_task("fetched", &task);
    Ok(())
}

pub async fn task_list(
    client: &DaemonClient,
    page_size: Option<i64>,
    page_token: &str,
) -> Result<()> {
    let mut params = json!({ "pageToken": page_token });
    if let Some(size) = page_size {
        params["pageSize"] = json!(size);
    }
    let result = client.call_once("task.list", params).await?;

    let tasks = result["tasks"].as_array().cloned().unwrap_or_default();
    for task in &tasks {
        println!(
            "task id={} title={:?} description={:?}",
            task["id"].as_str().unwrap_or("?"),
            task["title"].as_str().unwrap_or(""),
            task["description"].as_str().unwrap_or(""),
        );
    }
    println!(
        "next page token: {:?}",
        result["nextPageToken"].as_str().unwrap_or("")
    );
    Ok(())
}

/// Arm the one-shot failure injector on the daemon (operator/test hook).
pub async fn task_fail_next(client: &DaemonClient) -> Result<()> {
    client.call_once("task.failNext", json!({})).await?;
    println!("failure injector armed: the next task.create will fail Unavailable");
    Ok(())
}

fn print_task(verb: &str, task: &Value) {
    println!(
        "{verb} task id={} title={:?} description={:?} status={}",
        task["id"].as_str().unwrap_or("?"),
        task["title"].as_str().unwrap_or(""),
        task["description"].as_str().unwrap_or(""),
        task["status"].as_str().unwrap_or(""),
    );
}
