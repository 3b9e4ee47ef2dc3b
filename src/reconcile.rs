use crate::buffer::EditBuffer;
use crate::model::{
    AttendanceContext, AttendanceMark, AttendanceRecord, GradeContext, GradeRecord,
    RosterContext, GRADE_MAX, GRADE_MIN,
};
use crate::roster::Roster;
use crate::store::RecordStore;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::hash::Hash;

/// A record kind that can be bulk-edited from a roster.
pub trait RosterRecord: Clone {
    type Context: RosterContext;
    type Value: Clone;
    type Key: Eq + Hash + Clone;

    fn id(&self) -> &str;
    fn natural_key(&self) -> Self::Key;
    fn key_for(student_id: &str, ctx: &Self::Context) -> Self::Key;
    fn value(&self) -> Self::Value;
    /// Values failing this are left out of a submit without raising an error.
    fn accepts(value: &Self::Value) -> bool;
    fn create(
        id: String,
        student_id: &str,
        ctx: &Self::Context,
        value: Self::Value,
        note: &str,
        today: NaiveDate,
    ) -> Self;
    fn apply(&mut self, value: Self::Value, note: &str, today: NaiveDate);

    fn collection(store: &RecordStore) -> &[Self];
    fn install(store: &mut RecordStore, records: Vec<Self>);
}

impl RosterRecord for AttendanceRecord {
    type Context = AttendanceContext;
    type Value = AttendanceMark;
    type Key = (String, String, NaiveDate);

    fn id(&self) -> &str {
        &self.id
    }

    fn natural_key(&self) -> Self::Key {
        (self.student_id.clone(), self.subject_id.clone(), self.date)
    }

    fn key_for(student_id: &str, ctx: &AttendanceContext) -> Self::Key {
        (student_id.to_string(), ctx.subject_id.clone(), ctx.date)
    }

    fn value(&self) -> AttendanceMark {
        self.mark
    }

    fn accepts(_value: &AttendanceMark) -> bool {
        true
    }

    fn create(
        id: String,
        student_id: &str,
        ctx: &AttendanceContext,
        value: AttendanceMark,
        note: &str,
        today: NaiveDate,
    ) -> Self {
        Self {
            id,
            student_id: student_id.to_string(),
            subject_id: ctx.subject_id.clone(),
            date: ctx.date,
            mark: value,
            note: note.to_string(),
            updated_on: today,
        }
    }

    fn apply(&mut self, value: AttendanceMark, note: &str, today: NaiveDate) {
        self.mark = value;
        self.note = note.to_string();
        self.updated_on = today;
    }

    fn collection(store: &RecordStore) -> &[Self] {
        store.attendance()
    }

    fn install(store: &mut RecordStore, records: Vec<Self>) {
        store.attendance = records;
    }
}

impl RosterRecord for GradeRecord {
    type Context = GradeContext;
    type Value = f64;
    type Key = (String, String);

    fn id(&self) -> &str {
        &self.id
    }

    fn natural_key(&self) -> Self::Key {
        (self.student_id.clone(), self.evaluation_id.clone())
    }

    fn key_for(student_id: &str, ctx: &GradeContext) -> Self::Key {
        (student_id.to_string(), ctx.evaluation_id.clone())
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn accepts(value: &f64) -> bool {
        value.is_finite() && (GRADE_MIN..=GRADE_MAX).contains(value)
    }

    fn create(
        id: String,
        student_id: &str,
        ctx: &GradeContext,
        value: f64,
        note: &str,
        today: NaiveDate,
    ) -> Self {
        Self {
            id,
            student_id: student_id.to_string(),
            evaluation_id: ctx.evaluation_id.clone(),
            value,
            note: note.to_string(),
            updated_on: today,
        }
    }

    fn apply(&mut self, value: f64, note: &str, today: NaiveDate) {
        self.value = value;
        self.note = note.to_string();
        self.updated_on = today;
    }

    fn collection(store: &RecordStore) -> &[Self] {
        store.grades()
    }

    fn install(store: &mut RecordStore, records: Vec<Self>) {
        store.grades = records;
    }
}

/// Opens a buffer for `roster`, pre-filled with whatever is already recorded
/// for each student under `ctx`.
pub fn seed_buffer<R: RosterRecord>(
    roster: &Roster,
    existing: &[R],
    ctx: &R::Context,
) -> EditBuffer<R::Value> {
    let by_key: HashMap<R::Key, &R> = existing.iter().map(|r| (r.natural_key(), r)).collect();
    let mut buffer = EditBuffer::for_roster(roster);
    for student_id in roster.ids() {
        if let Some(rec) = by_key.get(&R::key_for(student_id, ctx)) {
            // Every roster id is a buffer row, so this cannot miss.
            let _ = buffer.set(student_id, rec.value());
        }
    }
    buffer
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<R> {
    /// The whole collection after the merge.
    pub records: Vec<R>,
    /// Records inserted or updated by this merge, in buffer order.
    pub written: Vec<R>,
    /// Students whose pending value was left out by the range policy.
    pub ignored: Vec<String>,
}

impl<R> Reconciled<R> {
    pub fn written_count(&self) -> usize {
        self.written.len()
    }
}

/// Merges the pending rows of `buffer` into `existing` by natural key.
///
/// Unset rows are skipped and nothing is ever deleted. An existing record
/// keeps its id; a new one takes the next id from `next_id`.
pub fn reconcile<R, F>(
    existing: &[R],
    buffer: &EditBuffer<R::Value>,
    ctx: &R::Context,
    note: &str,
    today: NaiveDate,
    mut next_id: F,
) -> Reconciled<R>
where
    R: RosterRecord,
    F: FnMut() -> String,
{
    let mut records: Vec<R> = existing.to_vec();
    let mut index: HashMap<R::Key, usize> = HashMap::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        index.entry(r.natural_key()).or_insert(i);
    }

    let mut written: Vec<R> = Vec::new();
    let mut ignored: Vec<String> = Vec::new();

    for (student_id, value) in buffer.pending() {
        if !R::accepts(value) {
            ignored.push(student_id.to_string());
            continue;
        }
        let key = R::key_for(student_id, ctx);
        match index.get(&key) {
            Some(&i) => {
                records[i].apply(value.clone(), note, today);
                written.push(records[i].clone());
            }
            None => {
                let rec = R::create(next_id(), student_id, ctx, value.clone(), note, today);
                index.insert(key, records.len());
                written.push(rec.clone());
                records.push(rec);
            }
        }
    }

    Reconciled {
        records,
        written,
        ignored,
    }
}
