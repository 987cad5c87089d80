use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// One response for any failed repository call, logged at the call site.
/// Errors stop here: nothing upstream retries or re-propagates them.
pub fn store_err(id: &str, op: &str, e: anyhow::Error) -> serde_json::Value {
    log::error!("{} failed: {:#}", op, e);
    err(id, "store_error", e.to_string(), Some(json!({ "op": op })))
}
