use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{section_usize, SetupSection};
use crate::ipc::types::{AppState, Request};
use crate::store::RecordStore;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// Opens (or creates) a workspace and replaces all in-memory state with it.
/// Any open edit sessions belong to the previous workspace and are dropped.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let store = db::load_store(&conn)?;
    let max_open = section_usize(&conn, SetupSection::Sessions, "maxOpen");

    state.sessions.clear();
    state.sessions.set_max_open(max_open);
    state.store = store;
    state.db = Some(conn);
    state.workspace = Some(path.to_path_buf());
    info!(
        workspace = %path.display(),
        students = state.store.students.len(),
        "workspace opened"
    );
    Ok(())
}

/// Forgets the current workspace so nothing is served from stale data.
pub fn close_workspace(state: &mut AppState) {
    state.sessions.clear();
    state.store = RecordStore::default();
    state.db = None;
    state.workspace = None;
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
