use rusqlite::Connection;
use serde::Deserialize;

use crate::repo::Store;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    /// Student/class repository, local or remote — fixed for the session.
    pub store: Box<dyn Store>,
    /// Payments, fee catalog and academic calendar; always local.
    pub ledger: Connection,
    pub backend: &'static str,
    pub remote_connected: bool,
}
