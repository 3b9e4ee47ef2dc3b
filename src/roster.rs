use crate::model::{Enrollment, RosterContext, Student};
use std::cmp::Ordering;
use std::collections::HashSet;

pub const EMPTY_ROSTER_MESSAGE: &str = "no students enrolled";

/// Students shown for one context, already in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub students: Vec<Student>,
}

impl Roster {
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.students.iter().map(|s| s.id.as_str())
    }
}

/// Students of `ctx.course` enrolled in `ctx.subject`, ordered by surname
/// then first name (case-insensitive, id as the final tie-break).
pub fn select_roster<C: RosterContext>(
    students: &[Student],
    enrollments: &[Enrollment],
    ctx: &C,
) -> Roster {
    let enrolled: HashSet<&str> = enrollments
        .iter()
        .filter(|e| e.subject_id == ctx.subject_id())
        .map(|e| e.student_id.as_str())
        .collect();

    let mut picked: Vec<Student> = students
        .iter()
        .filter(|s| s.course == ctx.course() && enrolled.contains(s.id.as_str()))
        .cloned()
        .collect();
    picked.sort_by(roster_order);

    Roster { students: picked }
}

pub fn roster_order(a: &Student, b: &Student) -> Ordering {
    a.last_name
        .to_lowercase()
        .cmp(&b.last_name.to_lowercase())
        .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}
