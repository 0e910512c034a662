use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_opt_str, get_required_str, require_source};
use crate::ipc::types::{AppState, Request};
use crate::model::EntityKind;
use crate::remote::{RecordFilter, WriteOp};
use crate::validate;
use serde_json::json;
use tracing::info;

fn get_kind(params: &serde_json::Value) -> Result<EntityKind, HandlerErr> {
    let raw = get_required_str(params, "kind")?;
    EntityKind::parse(&raw).ok_or_else(|| HandlerErr::bad_params(format!("unknown kind: {}", raw)))
}

fn get_payload(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    match params.get("payload") {
        Some(p) if p.is_object() => Ok(p.clone()),
        _ => Err(HandlerErr::bad_params("missing payload object")),
    }
}

async fn records_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let kind = get_kind(params)?;
    let filter = RecordFilter {
        student_id: get_opt_str(params, "studentId"),
    };
    let rows = source.engine.client().fetch(kind, &filter).await?;
    Ok(json!({ "kind": kind, "rows": rows }))
}

async fn records_write(
    state: &AppState,
    params: &serde_json::Value,
    verb: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let source = require_source(state)?;
    let kind = get_kind(params)?;
    let op = match verb {
        "create" => {
            let payload = get_payload(params)?;
            validate::check(kind, &payload, false)?;
            WriteOp::Create(payload)
        }
        "update" => {
            let id = get_required_str(params, "id")?;
            let payload = get_payload(params)?;
            validate::check(kind, &payload, true)?;
            WriteOp::Update { id, payload }
        }
        _ => WriteOp::Delete {
            id: get_required_str(params, "id")?,
        },
    };
    let record = source.engine.client().write(kind, op).await?;
    info!(%kind, verb, "record written");
    Ok(json!({ "kind": kind, "record": record }))
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "records.list" => records_list(state, &req.params).await,
        "records.create" => records_write(state, &req.params, "create").await,
        "records.update" => records_write(state, &req.params, "update").await,
        "records.delete" => records_write(state, &req.params, "delete").await,
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
