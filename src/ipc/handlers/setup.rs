use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::require_db;
use crate::ipc::types::{AppState, Request};
use crate::session::DEFAULT_MAX_OPEN_SESSIONS;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_NOTE_MAX_CHARS: i64 = 500;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SetupSection {
    Attendance,
    Grades,
    Sessions,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [Self::Attendance, Self::Grades, Self::Sessions];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            "grades" => Some(Self::Grades),
            "sessions" => Some(Self::Sessions),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::Grades => "grades",
            Self::Sessions => "sessions",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Attendance => "setup.attendance",
            Self::Grades => "setup.grades",
            Self::Sessions => "setup.sessions",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Attendance | SetupSection::Grades => json!({
            "noteMaxChars": DEFAULT_NOTE_MAX_CHARS
        }),
        SetupSection::Sessions => json!({
            "maxOpen": DEFAULT_MAX_OPEN_SESSIONS
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match (section, k.as_str()) {
            (SetupSection::Attendance | SetupSection::Grades, "noteMaxChars") => {
                obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 2000)?));
            }
            (SetupSection::Sessions, "maxOpen") => {
                obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 64)?));
            }
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// One integer field of a section, falling back to the built-in default.
pub fn section_usize(conn: &Connection, section: SetupSection, field: &str) -> usize {
    let fallback = default_section(section)
        .get(field)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    load_section(conn, section)
        .ok()
        .and_then(|v| v.get(field).and_then(|v| v.as_u64()))
        .unwrap_or(fallback) as usize
}

pub fn note_max_chars(conn: &Connection, section: SetupSection) -> usize {
    section_usize(conn, section, "noteMaxChars")
}

fn setup_get(conn: &Connection) -> Result<Value, HandlerErr> {
    let mut out = Map::new();
    for section in SetupSection::ALL {
        let v = load_section(conn, section)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        out.insert(section.name().to_string(), v);
    }
    Ok(Value::Object(out))
}

fn setup_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let section_raw = params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section = SetupSection::parse(section_raw)
        .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut current = load_section(conn, section)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    merge_section_patch(section, &mut current, patch).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    if section == SetupSection::Sessions {
        let max_open = section_usize(conn, SetupSection::Sessions, "maxOpen");
        state.sessions.set_max_open(max_open);
    }
    Ok(json!({ "ok": true, "section": section.name(), "value": current }))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    respond(&req.id, require_db(state).and_then(setup_get))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    respond(&req.id, setup_update(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
