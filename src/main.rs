mod db;
mod ipc;
mod model;
mod reconcile;
mod remote;
mod repo;
mod seed;

use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // One backend per session, picked here and never re-probed.
    let selected = repo::select_store()?;
    let mut state = ipc::AppState {
        store: selected.store,
        ledger: db::open_ledger_db()?,
        backend: selected.backend,
        remote_connected: selected.remote_connected,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; ignore.
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    Ok(())
}
