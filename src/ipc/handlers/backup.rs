use crate::backup;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::core::{close_workspace, open_workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

fn required_path(params: &serde_json::Value, key: &str) -> Result<PathBuf, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(PathBuf::from(v.trim())),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

fn reopen_failed(state: &mut AppState, workspace_path: &Path, e: anyhow::Error) -> HandlerErr {
    error!(workspace = %workspace_path.display(), error = %format!("{e:#}"), "workspace reopen failed");
    close_workspace(state);
    HandlerErr::new("db_open_failed", format!("{e:#}"))
}

fn backup_export(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let out = required_path(params, "outPath")?;
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::no_workspace());
    };
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            warn!(error = %e, "wal checkpoint before export failed");
        }
    }

    let export = backup::export_workspace_bundle(&workspace_path, &out).map_err(|e| {
        HandlerErr::new("backup_failed", format!("{e:#}"))
            .with_details(json!({ "path": out.to_string_lossy() }))
    })?;
    Ok(json!({
        "ok": true,
        "path": out.to_string_lossy(),
        "bundleFormat": export.bundle_format,
        "dbSha256": export.db_sha256,
    }))
}

fn backup_import(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let src = required_path(params, "inPath")?;
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::no_workspace());
    };
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file not found")
            .with_details(json!({ "path": src.to_string_lossy() })));
    }

    // The open handle must be released before the database file is replaced.
    state.db = None;
    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            // The database was not touched; hand back the connection and keep
            // the open sessions.
            let failed = HandlerErr::new("backup_failed", format!("{e:#}"))
                .with_details(json!({ "path": src.to_string_lossy() }));
            return match db::open_db(&workspace_path) {
                Ok(conn) => {
                    state.db = Some(conn);
                    Err(failed)
                }
                Err(e) => Err(reopen_failed(state, &workspace_path, e)),
            };
        }
    };
    if let Err(e) = open_workspace(state, &workspace_path) {
        return Err(reopen_failed(state, &workspace_path, e));
    }
    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "students": state.store.students.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspace" => backup_export(state, &req.params),
        "backup.importWorkspace" => backup_import(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
