use crate::db::SqliteSink;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::{note_max_chars, SetupSection};
use crate::ipc::helpers::{
    get_note, get_required_str, get_selector, require_db, roster_json, submit_session,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceContext, AttendanceMark, AttendanceRecord};
use crate::persist::RecordSink;
use crate::session::{EditSession, Session};
use crate::views::attendance_summary;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

fn parse_mark(v: Option<&serde_json::Value>) -> Result<Option<AttendanceMark>, HandlerErr> {
    let Some(v) = v else { return Ok(None) };
    if v.is_null() {
        return Ok(None);
    }
    let s = v
        .as_str()
        .ok_or_else(|| HandlerErr::bad_params("mark must be string or null"))?;
    AttendanceMark::parse(s)
        .map(Some)
        .ok_or_else(|| {
            HandlerErr::bad_params("mark must be one of: present, absent")
                .with_details(json!({ "mark": s }))
        })
}

fn session_not_found(session_id: &str) -> HandlerErr {
    HandlerErr::not_found("attendance session not found")
        .with_details(json!({ "sessionId": session_id }))
}

fn attendance_roster_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let ctx = AttendanceContext::new(
        &get_selector(params, "course"),
        &get_selector(params, "subjectId"),
        &get_selector(params, "date"),
    )
    .map_err(|e| {
        warn!(error = %e, "attendance roster selection rejected");
        HandlerErr::from(e)
    })?;
    if state.store.subject(&ctx.subject_id).is_none() {
        return Err(HandlerErr::not_found("subject not found"));
    }

    let session: Session<AttendanceRecord> =
        Session::open(Uuid::new_v4().to_string(), ctx, &state.store);
    let mut body = roster_json(&session, |m| json!(m.as_str()));
    body["context"] = json!(session.context);
    debug!(
        session = %session.id,
        rows = session.roster.len(),
        seeded = session.buffer.pending_count(),
        "attendance roster opened"
    );

    let evicted = state.sessions.insert(EditSession::Attendance(session));
    debug!(open = state.sessions.len(), evicted = evicted.len(), "attendance session registered");
    body["evictedSessions"] = json!(evicted);
    Ok(body)
}

fn attendance_set_mark(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let student_id = get_required_str(params, "studentId")?;
    let mark = parse_mark(params.get("mark"))?;
    let session = state
        .sessions
        .attendance_mut(&session_id)
        .ok_or_else(|| session_not_found(&session_id))?;
    match mark {
        Some(m) => session.buffer.set(&student_id, m)?,
        None => session.buffer.clear(&student_id)?,
    }
    Ok(json!({ "ok": true, "pending": session.buffer.pending_count() }))
}

fn attendance_set_all(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let mark = parse_mark(params.get("mark"))?
        .ok_or_else(|| HandlerErr::bad_params("missing mark"))?;
    let session = state
        .sessions
        .attendance_mut(&session_id)
        .ok_or_else(|| session_not_found(&session_id))?;
    session.buffer.set_all(mark);
    Ok(json!({ "ok": true, "pending": session.buffer.pending_count() }))
}

fn attendance_submit(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let AppState {
        db,
        store,
        sessions,
        attendance_views,
        ..
    } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let note = get_note(params, note_max_chars(conn, SetupSection::Attendance))?;
    let session = sessions
        .attendance_mut(&session_id)
        .ok_or_else(|| session_not_found(&session_id))?;

    let out = submit_session(conn, store, session, attendance_views, &note)?;
    sessions.remove(&session_id);
    Ok(out)
}

fn attendance_cancel(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let discarded = match state.sessions.get(&session_id) {
        Some(EditSession::Attendance(s)) => s.buffer.pending_count(),
        _ => return Err(session_not_found(&session_id)),
    };
    state.sessions.remove(&session_id);
    debug!(session = %session_id, discarded, "attendance session cancelled");
    Ok(json!({ "ok": true, "discarded": discarded }))
}

fn attendance_summary_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    Ok(json!({ "groups": attendance_summary(&state.store) }))
}

fn attendance_delete_record(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let conn = require_db(state)?;
    if !state.store.attendance().iter().any(|r| r.id == record_id) {
        return Err(HandlerErr::not_found("attendance record not found"));
    }
    let sink = SqliteSink::new(conn);
    RecordSink::<AttendanceRecord>::delete(&sink, &record_id).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "attendance_records" }))
    })?;
    state.store.remove_attendance(&record_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.rosterOpen" => attendance_roster_open(state, &req.params),
        "attendance.setMark" => attendance_set_mark(state, &req.params),
        "attendance.setAll" => attendance_set_all(state, &req.params),
        "attendance.submit" => attendance_submit(state, &req.params),
        "attendance.cancel" => attendance_cancel(state, &req.params),
        "attendance.summary" => attendance_summary_get(state),
        "attendance.deleteRecord" => attendance_delete_record(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use crate::ipc::{handle_request, open_workspace, AppState, Request};
    use crate::model::AttendanceMark;
    use serde_json::{json, Value};

    fn call(state: &mut AppState, method: &str, params: Value) -> Value {
        handle_request(
            state,
            Request {
                id: "t".to_string(),
                method: method.to_string(),
                params,
            },
        )
    }

    fn call_ok(state: &mut AppState, method: &str, params: Value) -> Value {
        let resp = call(state, method, params);
        assert_eq!(resp["ok"].as_bool(), Some(true), "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    #[test]
    fn save_fault_keeps_session_buffer_and_store() {
        let ws = std::env::temp_dir().join(format!("rosterd-save-fault-{}", uuid::Uuid::new_v4()));
        let mut state = AppState::new();
        open_workspace(&mut state, &ws).expect("open workspace");

        let subject = call_ok(&mut state, "subjects.create", json!({ "name": "Art", "course": "1B" }));
        let subject_id = subject["subjectId"].as_str().expect("subjectId").to_string();
        let mut ids = Vec::new();
        for last in ["Ortega", "Pons"] {
            let s = call_ok(
                &mut state,
                "students.create",
                json!({ "firstName": "Eva", "lastName": last, "course": "1B" }),
            );
            let sid = s["studentId"].as_str().expect("studentId").to_string();
            call_ok(
                &mut state,
                "enrollments.set",
                json!({ "studentId": sid, "subjectId": subject_id }),
            );
            ids.push(sid);
        }

        let opened = call_ok(
            &mut state,
            "attendance.rosterOpen",
            json!({ "course": "1B", "subjectId": subject_id, "date": "2026-02-09" }),
        );
        let session_id = opened["sessionId"].as_str().expect("sessionId").to_string();
        call_ok(
            &mut state,
            "attendance.setAll",
            json!({ "sessionId": session_id, "mark": "present" }),
        );

        // Remove one student behind the store's back so the insert violates
        // the foreign key.
        {
            let conn = state.db.as_ref().expect("db");
            conn.execute("DELETE FROM enrollments WHERE student_id = ?", [&ids[1]])
                .expect("delete enrollment");
            conn.execute("DELETE FROM students WHERE id = ?", [&ids[1]])
                .expect("delete student");
        }

        let resp = call(
            &mut state,
            "attendance.submit",
            json!({ "sessionId": session_id, "note": "kept" }),
        );
        assert_eq!(resp["ok"].as_bool(), Some(false));
        assert_eq!(resp["error"]["code"].as_str(), Some("save_failed"));
        assert_eq!(resp["error"]["details"]["bufferPreserved"].as_bool(), Some(true));

        let session = state
            .sessions
            .attendance_mut(&session_id)
            .expect("session still open");
        assert_eq!(session.buffer.get(&ids[0]), Some(&AttendanceMark::Present));
        assert_eq!(session.buffer.get(&ids[1]), Some(&AttendanceMark::Present));
        assert!(state.store.attendance().is_empty());

        let stored: i64 = state
            .db
            .as_ref()
            .expect("db")
            .query_row("SELECT COUNT(*) FROM attendance_records", [], |r| r.get(0))
            .expect("count");
        assert_eq!(stored, 0);

        let _ = std::fs::remove_dir_all(ws);
    }
}
