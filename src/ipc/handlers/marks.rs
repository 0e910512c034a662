use crate::engine::reconcile::{HistoryScope, MarkScope};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_source, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::ExamType;
use serde_json::json;

async fn marks_open(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let raw_exam = get_required_str(params, "examType")?;
    let exam_type = ExamType::parse(&raw_exam)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown examType: {}", raw_exam)))?;
    let scope = MarkScope {
        subject: get_required_str(params, "subject")?,
        exam_type,
        semester: get_required_str(params, "semester")?,
    };
    let snapshot = source.engine.select_history(HistoryScope::Marks(scope)).await?;
    to_json(&snapshot)
}

async fn marks_stats(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let stats = source.engine.mark_statistics()?;
    Ok(json!({
        "classAverage": stats.map(|s| s.average),
        "stats": to_json(&stats)?,
    }))
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.open" => marks_open(state, &req.params).await,
        "marks.stats" => marks_stats(state).await,
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
