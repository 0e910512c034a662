use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub async fn handle_request(state: &AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::records::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::view::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::marks::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::dashboard::try_handle(state, &req).await {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
