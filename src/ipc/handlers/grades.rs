use crate::db::SqliteSink;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::{note_max_chars, SetupSection};
use crate::ipc::helpers::{
    get_note, get_required_str, get_selector, require_db, roster_json, submit_session,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{GradeContext, GradeRecord, GRADE_MAX, GRADE_MIN};
use crate::persist::RecordSink;
use crate::session::{EditSession, Session};
use crate::views::grade_summary;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

/// Any number is buffered as typed; the 0..=10 range is only enforced when
/// the roster is submitted.
fn parse_grade_value(v: Option<&serde_json::Value>) -> Result<Option<f64>, HandlerErr> {
    let Some(v) = v else { return Ok(None) };
    if v.is_null() {
        return Ok(None);
    }
    if let Some(n) = v.as_f64() {
        return Ok(Some(n));
    }
    let Some(s) = v.as_str() else {
        return Err(HandlerErr::bad_params("value must be number, string or null"));
    };
    let t = s.trim();
    if t.is_empty() {
        return Ok(None);
    }
    t.parse::<f64>().map(Some).map_err(|_| {
        HandlerErr::bad_params("value must be numeric").with_details(json!({ "value": s }))
    })
}

fn session_not_found(session_id: &str) -> HandlerErr {
    HandlerErr::not_found("grades session not found")
        .with_details(json!({ "sessionId": session_id }))
}

fn grades_roster_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let ctx = GradeContext::new(
        &get_selector(params, "course"),
        &get_selector(params, "subjectId"),
        &get_selector(params, "evaluationId"),
    )
    .map_err(|e| {
        warn!(error = %e, "grades roster selection rejected");
        HandlerErr::from(e)
    })?;
    if state.store.subject(&ctx.subject_id).is_none() {
        return Err(HandlerErr::not_found("subject not found"));
    }
    let Some(evaluation) = state.store.evaluation(&ctx.evaluation_id) else {
        return Err(HandlerErr::not_found("evaluation not found"));
    };
    if evaluation.subject_id != ctx.subject_id {
        return Err(
            HandlerErr::bad_params("evaluation does not belong to subject").with_details(json!({
                "evaluationId": ctx.evaluation_id,
                "subjectId": ctx.subject_id,
            })),
        );
    }
    let evaluation_json = json!(evaluation);

    let session: Session<GradeRecord> =
        Session::open(Uuid::new_v4().to_string(), ctx, &state.store);
    let mut body = roster_json(&session, |v| json!(v));
    body["context"] = json!(session.context);
    body["evaluation"] = evaluation_json;
    body["range"] = json!({ "min": GRADE_MIN, "max": GRADE_MAX });
    debug!(
        session = %session.id,
        rows = session.roster.len(),
        seeded = session.buffer.pending_count(),
        "grades roster opened"
    );

    let evicted = state.sessions.insert(EditSession::Grades(session));
    debug!(open = state.sessions.len(), evicted = evicted.len(), "grades session registered");
    body["evictedSessions"] = json!(evicted);
    Ok(body)
}

fn grades_set_value(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let student_id = get_required_str(params, "studentId")?;
    let value = parse_grade_value(params.get("value"))?;
    let session = state
        .sessions
        .grades_mut(&session_id)
        .ok_or_else(|| session_not_found(&session_id))?;
    match value {
        Some(v) => session.buffer.set(&student_id, v)?,
        None => session.buffer.clear(&student_id)?,
    }
    Ok(json!({ "ok": true, "pending": session.buffer.pending_count() }))
}

fn grades_submit(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let AppState {
        db,
        store,
        sessions,
        grade_views,
        ..
    } = state;
    let conn = db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let note = get_note(params, note_max_chars(conn, SetupSection::Grades))?;
    let session = sessions
        .grades_mut(&session_id)
        .ok_or_else(|| session_not_found(&session_id))?;

    let out = submit_session(conn, store, session, grade_views, &note)?;
    sessions.remove(&session_id);
    Ok(out)
}

fn grades_cancel(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let discarded = match state.sessions.get(&session_id) {
        Some(EditSession::Grades(s)) => s.buffer.pending_count(),
        _ => return Err(session_not_found(&session_id)),
    };
    state.sessions.remove(&session_id);
    debug!(session = %session_id, discarded, "grades session cancelled");
    Ok(json!({ "ok": true, "discarded": discarded }))
}

fn grades_summary_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    Ok(json!({ "groups": grade_summary(&state.store) }))
}

fn grades_delete_record(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let conn = require_db(state)?;
    if !state.store.grades().iter().any(|r| r.id == record_id) {
        return Err(HandlerErr::not_found("grade record not found"));
    }
    let sink = SqliteSink::new(conn);
    RecordSink::<GradeRecord>::delete(&sink, &record_id).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "grade_records" }))
    })?;
    state.store.remove_grade(&record_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.rosterOpen" => grades_roster_open(state, &req.params),
        "grades.setValue" => grades_set_value(state, &req.params),
        "grades.submit" => grades_submit(state, &req.params),
        "grades.cancel" => grades_cancel(state, &req.params),
        "grades.summary" => grades_summary_get(state),
        "grades.deleteRecord" => grades_delete_record(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
