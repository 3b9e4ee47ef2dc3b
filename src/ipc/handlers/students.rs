use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, get_required_text, require_db};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::roster::roster_order;
use serde_json::json;
use uuid::Uuid;

fn students_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let course = params.get("course").and_then(|v| v.as_str());
    let mut students: Vec<&Student> = state
        .store
        .students
        .iter()
        .filter(|s| course.map(|c| s.course == c).unwrap_or(true))
        .collect();
    students.sort_by(|a, b| roster_order(a, b));
    Ok(json!({ "students": students }))
}

fn students_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student = Student {
        id: Uuid::new_v4().to_string(),
        first_name: get_required_text(params, "firstName")?,
        last_name: get_required_text(params, "lastName")?,
        course: get_required_text(params, "course")?,
    };
    db::insert_student(conn, &student).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "students" }))
    })?;
    let out = json!({ "studentId": student.id, "student": student });
    state.store.students.push(student);
    Ok(out)
}

fn enrollments_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let subject_id = params.get("subjectId").and_then(|v| v.as_str());
    let rows: Vec<_> = state
        .store
        .enrollments
        .iter()
        .filter(|e| subject_id.map(|s| e.subject_id == s).unwrap_or(true))
        .collect();
    Ok(json!({ "enrollments": rows }))
}

fn enrollments_set(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let enrolled = match params.get("enrolled") {
        None => true,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params("enrolled must be boolean"))?,
    };
    if state.store.student(&student_id).is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }
    if state.store.subject(&subject_id).is_none() {
        return Err(HandlerErr::not_found("subject not found"));
    }

    db::set_enrolled(conn, &student_id, &subject_id, enrolled).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "enrollments" }))
    })?;
    let changed = state.store.set_enrolled(&student_id, &subject_id, enrolled);
    Ok(json!({ "ok": true, "changed": changed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.create" => students_create(state, &req.params),
        "enrollments.list" => enrollments_list(state, &req.params),
        "enrollments.set" => enrollments_set(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
