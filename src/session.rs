use crate::buffer::EditBuffer;
use crate::model::{AttendanceRecord, GradeRecord};
use crate::reconcile::{reconcile, seed_buffer, Reconciled, RosterRecord};
use crate::roster::{select_roster, Roster};
use crate::store::RecordStore;
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_MAX_OPEN_SESSIONS: usize = 16;

/// One open roster: context, rendered students and their pending values.
pub struct Session<R: RosterRecord> {
    pub id: String,
    pub context: R::Context,
    pub roster: Roster,
    pub buffer: EditBuffer<R::Value>,
}

impl<R: RosterRecord> Session<R> {
    pub fn open(id: String, context: R::Context, store: &RecordStore) -> Self {
        let roster = select_roster(&store.students, &store.enrollments, &context);
        let buffer = seed_buffer(&roster, R::collection(store), &context);
        Self {
            id,
            context,
            roster,
            buffer,
        }
    }

    pub fn submit_enabled(&self) -> bool {
        !self.roster.is_empty()
    }

    /// Merges this session's buffer against the store's current records.
    /// The store itself is not modified.
    pub fn reconcile(&self, store: &RecordStore, note: &str, today: NaiveDate) -> Reconciled<R> {
        reconcile(
            R::collection(store),
            &self.buffer,
            &self.context,
            note,
            today,
            || Uuid::new_v4().to_string(),
        )
    }
}

pub enum EditSession {
    Attendance(Session<AttendanceRecord>),
    Grades(Session<GradeRecord>),
}

impl EditSession {
    pub fn id(&self) -> &str {
        match self {
            Self::Attendance(s) => &s.id,
            Self::Grades(s) => &s.id,
        }
    }
}

/// Open edit sessions, oldest first. Opening past the limit drops the oldest
/// session and its unsaved buffer.
pub struct SessionRegistry {
    sessions: HashMap<String, EditSession>,
    order: VecDeque<String>,
    max_open: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPEN_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new(max_open: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            order: VecDeque::new(),
            max_open: max_open.max(1),
        }
    }

    pub fn set_max_open(&mut self, max_open: usize) {
        self.max_open = max_open.max(1);
    }

    /// Returns the ids of any sessions evicted to make room.
    pub fn insert(&mut self, session: EditSession) -> Vec<String> {
        let id = session.id().to_string();
        if self.sessions.insert(id.clone(), session).is_some() {
            self.order.retain(|v| *v != id);
        }
        self.order.push_back(id);

        let mut evicted = Vec::new();
        while self.order.len() > self.max_open {
            let Some(old) = self.order.pop_front() else {
                break;
            };
            self.sessions.remove(&old);
            debug!(session = %old, "edit session evicted");
            evicted.push(old);
        }
        evicted
    }

    pub fn remove(&mut self, id: &str) -> Option<EditSession> {
        let s = self.sessions.remove(id)?;
        self.order.retain(|v| v != id);
        Some(s)
    }

    pub fn get(&self, id: &str) -> Option<&EditSession> {
        self.sessions.get(id)
    }

    pub fn attendance_mut(&mut self, id: &str) -> Option<&mut Session<AttendanceRecord>> {
        match self.sessions.get_mut(id) {
            Some(EditSession::Attendance(s)) => Some(s),
            _ => None,
        }
    }

    pub fn grades_mut(&mut self, id: &str) -> Option<&mut Session<GradeRecord>> {
        match self.sessions.get_mut(id) {
            Some(EditSession::Grades(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceContext, AttendanceMark, Enrollment, GradeContext, Student};

    fn store() -> RecordStore {
        let mut store = RecordStore::default();
        for (id, last) in [("1", "Zamora"), ("2", "Alvarez")] {
            store.students.push(Student {
                id: id.into(),
                first_name: "X".into(),
                last_name: last.into(),
                course: "3A".into(),
            });
            store.enrollments.push(Enrollment {
                student_id: id.into(),
                subject_id: "math".into(),
            });
        }
        store
    }

    fn attendance(id: &str, store: &RecordStore) -> EditSession {
        let ctx = AttendanceContext::new("3A", "math", "2024-01-15").expect("context");
        EditSession::Attendance(Session::open(id.to_string(), ctx, store))
    }

    #[test]
    fn open_selects_and_orders_the_roster() {
        let store = store();
        let ctx = GradeContext::new("3A", "math", "e1").expect("context");
        let s: Session<GradeRecord> = Session::open("g".into(), ctx, &store);
        assert!(s.submit_enabled());
        assert_eq!(s.roster.ids().collect::<Vec<_>>(), vec!["2", "1"]);
        assert_eq!(s.buffer.pending_count(), 0);
    }

    #[test]
    fn oldest_session_is_evicted_past_the_limit() {
        let store = store();
        let mut reg = SessionRegistry::new(2);
        assert!(reg.insert(attendance("a", &store)).is_empty());
        assert!(reg.insert(attendance("b", &store)).is_empty());
        assert_eq!(reg.insert(attendance("c", &store)), vec!["a".to_string()]);
        assert!(reg.get("a").is_none());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn kind_mismatch_is_not_found() {
        let store = store();
        let mut reg = SessionRegistry::default();
        reg.insert(attendance("a", &store));
        assert!(reg.grades_mut("a").is_none());

        let s = reg.attendance_mut("a").expect("attendance session");
        s.buffer.set("1", AttendanceMark::Absent).expect("set");
        assert!(reg.remove("a").is_some());
        assert!(reg.remove("a").is_none());
    }
}
