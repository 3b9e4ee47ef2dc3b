use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::model::Subject;
use crate::views::{attendance_report, dashboard_counts, grade_report};
use serde_json::json;

fn required_subject<'a>(
    state: &'a AppState,
    params: &serde_json::Value,
) -> Result<&'a Subject, HandlerErr> {
    require_db(state)?;
    let subject_id = get_required_str(params, "subjectId")?;
    state
        .store
        .subject(&subject_id)
        .ok_or_else(|| HandlerErr::not_found("subject not found"))
}

fn reports_attendance(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject = required_subject(state, params)?;
    Ok(json!({
        "subject": subject,
        "rows": attendance_report(&state.store, subject),
    }))
}

fn reports_grades(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject = required_subject(state, params)?;
    Ok(json!({
        "subject": subject,
        "rows": grade_report(&state.store, subject),
    }))
}

fn dashboard(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    Ok(json!(dashboard_counts(&state.store)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.counts" => dashboard(state),
        "reports.attendance" => reports_attendance(state, &req.params),
        "reports.grades" => reports_grades(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
