mod backup;
mod buffer;
mod config;
mod db;
mod ipc;
mod model;
mod persist;
mod reconcile;
mod roster;
mod session;
mod store;
mod views;

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // stdout carries responses; logs must never touch it.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let args = config::Args::parse();
    init_tracing(&args.log_level);

    let mut state = ipc::AppState::new();
    if let Some(path) = args.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            error!(workspace = %path.display(), error = %format!("{e:#}"), "startup workspace failed to open");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "rosterd ready");

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();
    let mut buf: Vec<u8> = Vec::new();

    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        }

        // Can't reply without id, so both failures answer with a bare error.
        let req: Result<ipc::Request, String> = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => serde_json::from_str(line).map_err(|e| e.to_string()),
            Err(e) => Err(format!("request is not valid UTF-8: {}", e)),
        };
        let resp = match req {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(message) => {
                warn!(%message, "unreadable request line");
                serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": message }
                })
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
