use crate::engine::reconcile;
use crate::engine::roster::{self, RosterScope};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_opt_i64, get_opt_str, get_required_str, require_source, to_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

async fn students_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let scope = RosterScope {
        grade: get_opt_i64(params, "grade")?,
        section: get_opt_str(params, "section"),
    };
    let in_scope = roster::assemble_roster(source.engine.client(), &scope).await?;
    let matched = match get_opt_str(params, "search") {
        Some(term) => roster::search(&in_scope, &term).into_iter().cloned().collect::<Vec<_>>(),
        None => in_scope.clone(),
    };
    Ok(json!({
        "students": to_json(&matched)?,
        "total": in_scope.len(),
        "classes": roster::class_count(&in_scope),
        "gradeDistribution": roster::grade_distribution(&in_scope),
    }))
}

async fn students_profile(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let profile =
        reconcile::student_profile(source.engine.client(), &student_id, source.engine.limits()).await?;
    to_json(&profile)
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params).await,
        "students.profile" => students_profile(state, &req.params).await,
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
