use crate::model::{AttendanceMark, RosterContext, Subject};
use crate::persist::ViewRegistry;
use crate::roster::select_roster;
use crate::store::RecordStore;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

/// `Int(10*x + 0.5) / 10`, the rounding every displayed average uses.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn rate_percent(present: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(round_off_1_decimal(100.0 * present as f64 / total as f64))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceGroup {
    pub subject_id: String,
    pub subject_name: String,
    pub date: NaiveDate,
    pub present: usize,
    pub absent: usize,
    pub total: usize,
}

pub fn attendance_summary(store: &RecordStore) -> Vec<AttendanceGroup> {
    let mut groups: HashMap<(String, NaiveDate), AttendanceGroup> = HashMap::new();
    for r in store.attendance() {
        let g = groups
            .entry((r.subject_id.clone(), r.date))
            .or_insert_with(|| AttendanceGroup {
                subject_id: r.subject_id.clone(),
                subject_name: subject_name(store, &r.subject_id),
                date: r.date,
                present: 0,
                absent: 0,
                total: 0,
            });
        match r.mark {
            AttendanceMark::Present => g.present += 1,
            AttendanceMark::Absent => g.absent += 1,
        }
        g.total += 1;
    }

    let mut out: Vec<AttendanceGroup> = groups.into_values().collect();
    out.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.subject_name.cmp(&b.subject_name))
            .then_with(|| a.subject_id.cmp(&b.subject_id))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeGroup {
    pub evaluation_id: String,
    pub title: String,
    pub subject_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

pub fn grade_summary(store: &RecordStore) -> Vec<GradeGroup> {
    let mut by_eval: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for g in store.grades() {
        by_eval.entry(g.evaluation_id.as_str()).or_default().push(g.value);
    }

    let mut out: Vec<GradeGroup> = by_eval
        .into_iter()
        .map(|(eval_id, values)| {
            let eval = store.evaluation(eval_id);
            let sum: f64 = values.iter().sum();
            GradeGroup {
                evaluation_id: eval_id.to_string(),
                title: eval.map(|e| e.title.clone()).unwrap_or_default(),
                subject_id: eval.map(|e| e.subject_id.clone()),
                date: eval.map(|e| e.date),
                count: values.len(),
                average: round_off_1_decimal(sum / values.len() as f64),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.evaluation_id.cmp(&b.evaluation_id))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub students: usize,
    pub subjects: usize,
    pub evaluations: usize,
    pub attendance_records: usize,
    pub grade_records: usize,
    pub attendance_rate: Option<f64>,
}

pub fn dashboard_counts(store: &RecordStore) -> DashboardCounts {
    let present = store
        .attendance()
        .iter()
        .filter(|r| r.mark == AttendanceMark::Present)
        .count();
    DashboardCounts {
        students: store.students.len(),
        subjects: store.subjects.len(),
        evaluations: store.evaluations.len(),
        attendance_records: store.attendance().len(),
        grade_records: store.grades().len(),
        attendance_rate: rate_percent(present, store.attendance().len()),
    }
}

struct SubjectScope<'a>(&'a Subject);

impl RosterContext for SubjectScope<'_> {
    fn course(&self) -> &str {
        &self.0.course
    }

    fn subject_id(&self) -> &str {
        &self.0.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendance {
    pub student_id: String,
    pub display_name: String,
    pub present: usize,
    pub absent: usize,
    pub rate: Option<f64>,
}

/// Per-student attendance for one subject, in roster order.
pub fn attendance_report(store: &RecordStore, subject: &Subject) -> Vec<StudentAttendance> {
    let roster = select_roster(&store.students, &store.enrollments, &SubjectScope(subject));
    roster
        .students
        .iter()
        .map(|s| {
            let (mut present, mut absent) = (0, 0);
            for r in store
                .attendance()
                .iter()
                .filter(|r| r.student_id == s.id && r.subject_id == subject.id)
            {
                match r.mark {
                    AttendanceMark::Present => present += 1,
                    AttendanceMark::Absent => absent += 1,
                }
            }
            StudentAttendance {
                student_id: s.id.clone(),
                display_name: s.display_name(),
                present,
                absent,
                rate: rate_percent(present, present + absent),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrades {
    pub student_id: String,
    pub display_name: String,
    pub count: usize,
    pub average: Option<f64>,
}

/// Per-student grade average over every evaluation of one subject.
pub fn grade_report(store: &RecordStore, subject: &Subject) -> Vec<StudentGrades> {
    let eval_ids: HashSet<&str> = store
        .evaluations
        .iter()
        .filter(|e| e.subject_id == subject.id)
        .map(|e| e.id.as_str())
        .collect();
    let roster = select_roster(&store.students, &store.enrollments, &SubjectScope(subject));
    roster
        .students
        .iter()
        .map(|s| {
            let values: Vec<f64> = store
                .grades()
                .iter()
                .filter(|g| g.student_id == s.id && eval_ids.contains(g.evaluation_id.as_str()))
                .map(|g| g.value)
                .collect();
            let average = if values.is_empty() {
                None
            } else {
                Some(round_off_1_decimal(
                    values.iter().sum::<f64>() / values.len() as f64,
                ))
            };
            StudentGrades {
                student_id: s.id.clone(),
                display_name: s.display_name(),
                count: values.len(),
                average,
            }
        })
        .collect()
}

fn subject_name(store: &RecordStore, subject_id: &str) -> String {
    store
        .subject(subject_id)
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

/// Views refreshed after an attendance submit.
pub fn attendance_views() -> ViewRegistry {
    let mut views = ViewRegistry::default();
    views.register("summary", |s: &RecordStore| json!(attendance_summary(s)));
    views.register("dashboard", |s: &RecordStore| json!(dashboard_counts(s)));
    views
}

/// Views refreshed after a grades submit.
pub fn grade_views() -> ViewRegistry {
    let mut views = ViewRegistry::default();
    views.register("summary", |s: &RecordStore| json!(grade_summary(s)));
    views.register("dashboard", |s: &RecordStore| json!(dashboard_counts(s)));
    views
}
