use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const GRADE_MIN: f64 = 0.0;
pub const GRADE_MAX: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub course: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub course: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: String,
    pub subject_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: String,
    pub subject_id: String,
    pub title: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMark {
    Present,
    Absent,
}

impl AttendanceMark {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub date: NaiveDate,
    pub mark: AttendanceMark,
    pub note: String,
    pub updated_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: String,
    pub student_id: String,
    pub evaluation_id: String,
    pub value: f64,
    pub note: String,
    pub updated_on: NaiveDate,
}

/// Selector errors are user input errors, reported back to the caller as
/// `bad_params` rather than treated as faults.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("select a course first")]
    MissingCourse,
    #[error("select a subject first")]
    MissingSubject,
    #[error("select an evaluation first")]
    MissingEvaluation,
    #[error("select a date first")]
    MissingDate,
    #[error("date must be YYYY-MM-DD: {0}")]
    InvalidDate(String),
}

/// The scope shared by every roster: which course and which subject.
pub trait RosterContext {
    fn course(&self) -> &str;
    fn subject_id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceContext {
    pub course: String,
    pub subject_id: String,
    pub date: NaiveDate,
}

impl AttendanceContext {
    pub fn new(course: &str, subject_id: &str, date: &str) -> Result<Self, SelectionError> {
        let course = required(course, SelectionError::MissingCourse)?;
        let subject_id = required(subject_id, SelectionError::MissingSubject)?;
        let date = required(date, SelectionError::MissingDate)?;
        let date = parse_date(&date).ok_or(SelectionError::InvalidDate(date))?;
        Ok(Self {
            course,
            subject_id,
            date,
        })
    }
}

impl RosterContext for AttendanceContext {
    fn course(&self) -> &str {
        &self.course
    }

    fn subject_id(&self) -> &str {
        &self.subject_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeContext {
    pub course: String,
    pub subject_id: String,
    pub evaluation_id: String,
}

impl GradeContext {
    pub fn new(
        course: &str,
        subject_id: &str,
        evaluation_id: &str,
    ) -> Result<Self, SelectionError> {
        Ok(Self {
            course: required(course, SelectionError::MissingCourse)?,
            subject_id: required(subject_id, SelectionError::MissingSubject)?,
            evaluation_id: required(evaluation_id, SelectionError::MissingEvaluation)?,
        })
    }
}

impl RosterContext for GradeContext {
    fn course(&self) -> &str {
        &self.course
    }

    fn subject_id(&self) -> &str {
        &self.subject_id
    }
}

fn required(raw: &str, missing: SelectionError) -> Result<String, SelectionError> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(missing);
    }
    Ok(t.to_string())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
