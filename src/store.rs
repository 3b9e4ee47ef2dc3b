use crate::model::{AttendanceRecord, Enrollment, Evaluation, GradeRecord, Student, Subject};

/// In-memory copy of a workspace. Handlers read from it directly; record
/// collections are only replaced wholesale by `persist::commit` or trimmed by
/// single-row deletes.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub enrollments: Vec<Enrollment>,
    pub evaluations: Vec<Evaluation>,
    pub(crate) attendance: Vec<AttendanceRecord>,
    pub(crate) grades: Vec<GradeRecord>,
}

impl RecordStore {
    pub fn attendance(&self) -> &[AttendanceRecord] {
        &self.attendance
    }

    pub fn grades(&self) -> &[GradeRecord] {
        &self.grades
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn evaluation(&self, id: &str) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.id == id)
    }

    pub fn is_enrolled(&self, student_id: &str, subject_id: &str) -> bool {
        self.enrollments
            .iter()
            .any(|e| e.student_id == student_id && e.subject_id == subject_id)
    }

    /// Adds or removes one enrollment. Returns whether anything changed.
    pub fn set_enrolled(&mut self, student_id: &str, subject_id: &str, enrolled: bool) -> bool {
        let present = self.is_enrolled(student_id, subject_id);
        match (present, enrolled) {
            (false, true) => {
                self.enrollments.push(Enrollment {
                    student_id: student_id.to_string(),
                    subject_id: subject_id.to_string(),
                });
                true
            }
            (true, false) => {
                self.enrollments
                    .retain(|e| !(e.student_id == student_id && e.subject_id == subject_id));
                true
            }
            _ => false,
        }
    }

    pub fn remove_attendance(&mut self, record_id: &str) -> Option<AttendanceRecord> {
        let idx = self.attendance.iter().position(|r| r.id == record_id)?;
        Some(self.attendance.remove(idx))
    }

    pub fn remove_grade(&mut self, record_id: &str) -> Option<GradeRecord> {
        let idx = self.grades.iter().position(|r| r.id == record_id)?;
        Some(self.grades.remove(idx))
    }
}
