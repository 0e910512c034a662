use crate::db::LocalStore;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_opt_str, get_required_str};
use crate::ipc::types::{AppState, Request, Source};
use crate::remote::{Credentials, HttpRecordClient, RecordClient};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

fn open_workspace(state: &AppState, path: &Path) -> anyhow::Result<Arc<Source>> {
    let store = LocalStore::open(path)?;
    let client: Arc<dyn RecordClient> = Arc::new(store);
    Ok(state.install(Source::new(client, &state.config)))
}

fn connect_remote(state: &AppState, base_url: &str, token: &str) -> Result<Arc<Source>, HandlerErr> {
    let client = HttpRecordClient::new(
        base_url,
        Credentials::bearer(token),
        state.config.request_timeout(),
    )?;
    let client: Arc<dyn RecordClient> = Arc::new(client);
    Ok(state.install(Source::new(client, &state.config)))
}

/// Picks a source from configuration at startup: a workspace wins over a token.
pub fn autoconnect(state: &AppState) -> anyhow::Result<Option<String>> {
    if let Some(path) = state.config.workspace.clone() {
        let source = open_workspace(state, &path)?;
        return Ok(Some(source.label.clone()));
    }
    if let Some(token) = state.config.token.clone() {
        let api_url = state.config.api_url.clone();
        let source = connect_remote(state, &api_url, &token)
            .map_err(|e| anyhow::anyhow!("{}: {}", e.code, e.message))?;
        return Ok(Some(source.label.clone()));
    }
    Ok(None)
}

async fn handle_health(state: &AppState, req: &Request) -> serde_json::Value {
    let source = state.source();
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "source": source.as_ref().map(|s| s.label.clone()),
            "dirty": source.as_ref().map(|s| s.engine.dirty_count()).unwrap_or(0),
        }),
    )
}

async fn handle_workspace_select(state: &AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(source) => {
            info!(source = %source.label, "workspace selected");
            ok(
                &req.id,
                json!({ "workspacePath": path.to_string_lossy(), "source": source.label }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

async fn handle_session_connect(state: &AppState, req: &Request) -> serde_json::Value {
    let base_url = get_opt_str(&req.params, "baseUrl").unwrap_or_else(|| state.config.api_url.clone());
    let token = match get_required_str(&req.params, "token") {
        Ok(t) => t,
        Err(e) => match state.config.token.clone() {
            Some(t) => t,
            None => return e.response(&req.id),
        },
    };
    match connect_remote(state, &base_url, &token) {
        Ok(source) => {
            info!(source = %source.label, "session connected");
            ok(&req.id, json!({ "source": source.label }))
        }
        Err(e) => e.response(&req.id),
    }
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req).await),
        "workspace.select" => Some(handle_workspace_select(state, req).await),
        "session.connect" => Some(handle_session_connect(state, req).await),
        _ => None,
    }
}
