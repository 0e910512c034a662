use crate::engine::reconcile::Presence;
use crate::engine::roster::RosterScope;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_opt_i64, get_opt_str, get_required_f64, get_required_str, require_source, to_json,
};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use serde_json::json;

fn get_presence(params: &serde_json::Value) -> Result<Presence, HandlerErr> {
    let raw = get_opt_str(params, "status").unwrap_or_default();
    Presence::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("status must be Present, Absent or Unmarked, got {}", raw))
    })
}

async fn roster_select(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let scope = RosterScope {
        grade: get_opt_i64(params, "grade")?,
        section: get_opt_str(params, "section"),
    };
    source.engine.select_roster(scope).await?;
    to_json(&source.engine.snapshot()?)
}

async fn view_snapshot(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    to_json(&source.engine.snapshot()?)
}

async fn overlay_edit(
    state: &AppState,
    params: &serde_json::Value,
    method: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let engine = &source.engine;
    let dirty = match method {
        "overlay.setPresence" => {
            let student_id = get_required_str(params, "studentId")?;
            engine.set_presence(&student_id, get_presence(params)?)?
        }
        "overlay.markAll" => engine.mark_all(get_presence(params)?)?,
        _ => {
            let student_id = get_required_str(params, "studentId")?;
            let value = get_required_f64(params, "marksObtained")?;
            engine.set_mark(&student_id, value)?
        }
    };
    Ok(json!({ "dirty": dirty }))
}

async fn overlay_discard(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let student_id = get_opt_str(params, "studentId");
    let discarded = source.engine.discard(student_id.as_deref());
    Ok(json!({ "discarded": discarded, "dirty": source.engine.dirty_count() }))
}

async fn overlay_commit(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let report = source.engine.commit(Local::now().date_naive()).await?;
    Ok(json!({
        "report": to_json(&report)?,
        "snapshot": to_json(&source.engine.snapshot()?)?,
    }))
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "roster.select" => roster_select(state, &req.params).await,
        "view.snapshot" => view_snapshot(state).await,
        "overlay.setPresence" | "overlay.markAll" | "overlay.setMark" => {
            overlay_edit(state, &req.params, &req.method).await
        }
        "overlay.discard" => overlay_discard(state, &req.params).await,
        "overlay.commit" => overlay_commit(state).await,
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
