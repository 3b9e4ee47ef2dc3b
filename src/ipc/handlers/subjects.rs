use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, get_required_text, require_db};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_date, Evaluation, Subject};
use serde_json::json;
use uuid::Uuid;

fn subjects_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let course = params.get("course").and_then(|v| v.as_str());
    let mut subjects: Vec<&Subject> = state
        .store
        .subjects
        .iter()
        .filter(|s| course.map(|c| s.course == c).unwrap_or(true))
        .collect();
    subjects.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        name: get_required_text(params, "name")?,
        course: get_required_text(params, "course")?,
    };
    db::insert_subject(conn, &subject).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "subjects" }))
    })?;
    let out = json!({ "subjectId": subject.id, "subject": subject });
    state.store.subjects.push(subject);
    Ok(out)
}

fn evaluations_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let subject_id = params.get("subjectId").and_then(|v| v.as_str());
    let mut rows: Vec<&Evaluation> = state
        .store
        .evaluations
        .iter()
        .filter(|e| subject_id.map(|s| e.subject_id == s).unwrap_or(true))
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.title.cmp(&b.title)));
    Ok(json!({ "evaluations": rows }))
}

fn evaluations_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let subject_id = get_required_str(params, "subjectId")?;
    if state.store.subject(&subject_id).is_none() {
        return Err(HandlerErr::not_found("subject not found"));
    }
    let raw_date = get_required_str(params, "date")?;
    let date = parse_date(&raw_date)
        .ok_or_else(|| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    let evaluation = Evaluation {
        id: Uuid::new_v4().to_string(),
        subject_id,
        title: get_required_text(params, "title")?,
        date,
    };
    db::insert_evaluation(conn, &evaluation).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "evaluations" }))
    })?;
    let out = json!({ "evaluationId": evaluation.id, "evaluation": evaluation });
    state.store.evaluations.push(evaluation);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => subjects_list(state, &req.params),
        "subjects.create" => subjects_create(state, &req.params),
        "evaluations.list" => evaluations_list(state, &req.params),
        "evaluations.create" => evaluations_create(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
