use crate::dashboard;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{require_source, to_json};
use crate::ipc::types::{AppState, Request};
use chrono::Local;

async fn dashboard_open(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let engine = &source.engine;
    let dash = dashboard::open_dashboard(
        engine.client(),
        engine.limits(),
        Local::now().fixed_offset(),
    )
    .await?;
    to_json(&dash)
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.open" => dashboard_open(state).await,
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
