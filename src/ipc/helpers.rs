use crate::db::SqliteSink;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::persist::{commit, CommitError, RecordSink, ViewRegistry};
use crate::reconcile::RosterRecord;
use crate::roster::EMPTY_ROSTER_MESSAGE;
use crate::session::Session;
use crate::store::RecordStore;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use tracing::{info, warn};

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or_else(HandlerErr::no_workspace)
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Required, trimmed and non-empty.
pub fn get_required_text(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = get_required_str(params, key)?.trim().to_string();
    if v.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(v)
}

/// Selector values are read leniently; empty ones are rejected by the context
/// constructors with a message naming the missing selection.
pub fn get_selector(params: &serde_json::Value, key: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

pub fn get_note(params: &serde_json::Value, max_chars: usize) -> Result<String, HandlerErr> {
    let note = match params.get("note") {
        None => String::new(),
        Some(v) if v.is_null() => String::new(),
        Some(v) => v
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("note must be string or null"))?
            .trim()
            .to_string(),
    };
    if note.chars().count() > max_chars {
        return Err(HandlerErr::bad_params(format!(
            "note length must be <= {}",
            max_chars
        ))
        .with_details(json!({ "maxChars": max_chars })));
    }
    Ok(note)
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Response body for a freshly opened roster.
pub fn roster_json<R, F>(session: &Session<R>, value_json: F) -> serde_json::Value
where
    R: RosterRecord,
    F: Fn(&R::Value) -> serde_json::Value,
{
    let students: Vec<serde_json::Value> = session
        .roster
        .students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "firstName": s.first_name,
                "lastName": s.last_name,
                "displayName": s.display_name(),
                "course": s.course,
            })
        })
        .collect();
    let rows: Vec<serde_json::Value> = session
        .roster
        .ids()
        .map(|id| {
            json!({
                "studentId": id,
                "value": session.buffer.get(id).map(&value_json),
            })
        })
        .collect();
    let empty = session.roster.is_empty();
    let empty_message = if empty {
        Some(EMPTY_ROSTER_MESSAGE)
    } else {
        None
    };

    json!({
        "sessionId": session.id,
        "rowCount": session.roster.len(),
        "students": students,
        "rows": rows,
        "empty": empty,
        "emptyMessage": empty_message,
        "submitEnabled": session.submit_enabled(),
    })
}

/// Reconciles and commits one session. The caller closes the session only
/// when this returns `Ok`.
pub fn submit_session<R>(
    conn: &Connection,
    store: &mut RecordStore,
    session: &Session<R>,
    views: &ViewRegistry,
    note: &str,
) -> Result<serde_json::Value, HandlerErr>
where
    R: RosterRecord,
    for<'a> SqliteSink<'a>: RecordSink<R>,
{
    let merged = session.reconcile(store, note, today());
    let sink = SqliteSink::new(conn);
    match commit(store, &sink, merged, views) {
        Ok(done) => {
            info!(
                session = %session.id,
                written = done.written,
                ignored = done.ignored.len(),
                "roster submitted"
            );
            Ok(json!({
                "written": done.written,
                "ignored": done.ignored,
                "message": done.message,
                "views": done.views,
                "sessionClosed": true,
            }))
        }
        Err(CommitError::NothingToSave { ignored }) => Err(HandlerErr::new(
            "no_valid_entries",
            "no valid entries to save",
        )
        .with_details(json!({
            "sessionId": session.id,
            "ignored": ignored,
        }))),
        Err(e @ CommitError::Persist(_)) => {
            warn!(session = %session.id, error = %e, "roster submit failed; buffer kept");
            Err(HandlerErr::new("save_failed", e.to_string()).with_details(json!({
                "sessionId": session.id,
                "bufferPreserved": true,
            })))
        }
    }
}
