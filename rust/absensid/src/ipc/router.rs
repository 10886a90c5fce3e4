use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use serde_json::Value;

type TryHandle = fn(&mut AppState, &Request) -> Option<Value>;

// First handler that claims the method answers it.
const HANDLERS: [TryHandle; 8] = [
    handlers::core::try_handle,
    handlers::setup::try_handle,
    handlers::auth::try_handle,
    handlers::classes::try_handle,
    handlers::students::try_handle,
    handlers::import::try_handle,
    handlers::attendance::try_handle,
    handlers::reports::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> Value {
    tracing::debug!(id = %req.id, method = %req.method, "dispatch");
    for try_handle in HANDLERS {
        if let Some(resp) = try_handle(state, &req) {
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
