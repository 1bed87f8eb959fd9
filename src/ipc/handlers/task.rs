use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct CreateParams {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWithIdParams {
    task_id: String,
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetParams {
    task_id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ListParams {
    page_size: i64,
    page_token: String,
}

pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    let task = ctx.store.create(&p.title, &p.description).await?;
    Ok(serde_json::to_value(task)?)
}

pub async fn create_with_id(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateWithIdParams = serde_json::from_value(params)?;
    let task = ctx
        .store
        .create_with_id(&p.task_id, &p.title, &p.description)
        .await?;
    Ok(serde_json::to_value(task)?)
}

pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: GetParams = serde_json::from_value(params)?;
    let task = ctx.store.get(&p.task_id).await?;
    Ok(serde_json::to_value(task)?)
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = match params {
        Value::Null => ListParams::default(),
        other => serde_json::from_value(other)?,
    };
    let (tasks, next_page_token) = ctx.store.list(p.page_size, &p.page_token).await?;
    Ok(json!({ "tasks": tasks, "nextPageToken": next_page_token }))
}

/// Operator/test hook: arm the one-shot failure injector.
pub async fn fail_next(_params: Value, ctx: &AppContext) -> Result<Value> {
    ctx.store.arm_failure().await;
    Ok(json!({}))
}
