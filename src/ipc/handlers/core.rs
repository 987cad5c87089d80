use serde_json::json;

use crate::db;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::seed;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": state.backend
        }),
    )
}

fn handle_backend_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "backend": state.backend,
            "remoteConnected": state.remote_connected
        }),
    )
}

/// Test hook: wipe the roster and the ledger. The remote store refuses this,
/// which surfaces as a normal store_error.
fn handle_store_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = state.store.reset() {
        return store_err(&req.id, "store.reset", e);
    }
    if let Err(e) = db::reset_ledger(&state.ledger) {
        return store_err(&req.id, "store.reset", e);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_store_seed_demo(state: &mut AppState, req: &Request) -> serde_json::Value {
    match seed::seed_demo(state.store.as_ref(), &state.ledger) {
        Ok(summary) => match serde_json::to_value(summary) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => store_err(&req.id, "store.seedDemo", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "backend.status" => Some(handle_backend_status(state, req)),
        "store.reset" => Some(handle_store_reset(state, req)),
        "store.seedDemo" => Some(handle_store_seed_demo(state, req)),
        _ => None,
    }
}
