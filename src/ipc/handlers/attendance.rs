use crate::engine::reconcile::HistoryScope;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_required_date, require_source, to_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

async fn attendance_open(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let date = get_required_date(params, "date")?;
    let snapshot = source
        .engine
        .select_history(HistoryScope::Attendance { date })
        .await?;
    to_json(&snapshot)
}

async fn attendance_history(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let days = source.engine.attendance_history().await?;
    Ok(json!({ "days": to_json(&days)? }))
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.open" => attendance_open(state, &req.params).await,
        "attendance.history" => attendance_history(state).await,
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
