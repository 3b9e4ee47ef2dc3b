use crate::reconcile::{Reconciled, RosterRecord};
use crate::store::RecordStore;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// The save boundary for one record kind.
///
/// `save` upserts by natural key, so replaying the same batch is harmless.
pub trait RecordSink<R> {
    fn save(&self, batch: &[R]) -> anyhow::Result<()>;
    fn delete(&self, record_id: &str) -> anyhow::Result<bool>;
}

pub type RefreshFn = Box<dyn Fn(&RecordStore) -> Value>;

/// Views that are re-rendered after a successful commit. A view that was
/// never registered is simply absent from the refresh output.
#[derive(Default)]
pub struct ViewRegistry {
    views: Vec<(&'static str, RefreshFn)>,
}

impl ViewRegistry {
    pub fn register<F>(&mut self, name: &'static str, refresh: F)
    where
        F: Fn(&RecordStore) -> Value + 'static,
    {
        if self.contains(name) {
            self.views.retain(|(n, _)| *n != name);
        }
        self.views.push((name, Box::new(refresh)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.views.iter().any(|(n, _)| *n == name)
    }

    pub fn refresh_all(&self, store: &RecordStore) -> Map<String, Value> {
        self.views
            .iter()
            .map(|(name, refresh)| (name.to_string(), refresh(store)))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("no valid entries to save")]
    NothingToSave { ignored: Vec<String> },
    #[error("failed to save records: {0:#}")]
    Persist(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub written: usize,
    pub ignored: Vec<String>,
    pub message: String,
    pub views: Map<String, Value>,
}

pub fn saved_message(written: usize) -> String {
    if written == 1 {
        "1 record saved".to_string()
    } else {
        format!("{} records saved", written)
    }
}

/// Saves the rows written by a merge and, once the sink accepts them, makes
/// the merged collection current and refreshes the registered views.
///
/// On any error the store is left exactly as it was.
pub fn commit<R, S>(
    store: &mut RecordStore,
    sink: &S,
    reconciled: Reconciled<R>,
    views: &ViewRegistry,
) -> Result<Committed, CommitError>
where
    R: RosterRecord,
    S: RecordSink<R> + ?Sized,
{
    if reconciled.written_count() == 0 {
        return Err(CommitError::NothingToSave {
            ignored: reconciled.ignored,
        });
    }
    let Reconciled {
        records,
        written,
        ignored,
    } = reconciled;

    if let Err(e) = sink.save(&written) {
        warn!(rows = written.len(), error = %e, "save failed; store left unchanged");
        return Err(CommitError::Persist(e));
    }

    debug!(
        ids = ?written.iter().map(RosterRecord::id).collect::<Vec<_>>(),
        "records saved"
    );
    R::install(store, records);
    info!(written = written.len(), ignored = ignored.len(), "records committed");

    Ok(Committed {
        written: written.len(),
        ignored,
        message: saved_message(written.len()),
        views: views.refresh_all(store),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::EditBuffer;
    use crate::model::{AttendanceContext, AttendanceMark, AttendanceRecord, Student};
    use crate::reconcile::reconcile;
    use crate::roster::Roster;
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct MemorySink {
        calls: Cell<usize>,
        saved: RefCell<Vec<AttendanceRecord>>,
        fail: bool,
    }

    impl RecordSink<AttendanceRecord> for MemorySink {
        fn save(&self, batch: &[AttendanceRecord]) -> anyhow::Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            self.saved.borrow_mut().extend_from_slice(batch);
            Ok(())
        }

        fn delete(&self, _record_id: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).expect("date")
    }

    fn ctx() -> AttendanceContext {
        AttendanceContext::new("3A", "3", "2024-01-15").expect("context")
    }

    fn roster(ids: &[&str]) -> Roster {
        Roster {
            students: ids
                .iter()
                .map(|id| Student {
                    id: id.to_string(),
                    first_name: "F".into(),
                    last_name: format!("L{}", id),
                    course: "3A".into(),
                })
                .collect(),
        }
    }

    fn next_id() -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("r{}", n)
        }
    }

    #[test]
    fn empty_roster_never_reaches_the_sink() {
        let mut store = RecordStore::default();
        let sink = MemorySink::default();
        let buf: EditBuffer<AttendanceMark> = EditBuffer::for_roster(&Roster::default());
        let merged: Reconciled<AttendanceRecord> =
            reconcile(store.attendance(), &buf, &ctx(), "", today(), next_id());

        let res = commit(&mut store, &sink, merged, &ViewRegistry::default());
        assert!(matches!(res, Err(CommitError::NothingToSave { .. })));
        assert_eq!(sink.calls.get(), 0);
    }

    #[test]
    fn persistence_fault_leaves_the_store_untouched() {
        let mut store = RecordStore::default();
        let sink = MemorySink {
            fail: true,
            ..Default::default()
        };
        let mut buf = EditBuffer::for_roster(&roster(&["7"]));
        buf.set("7", AttendanceMark::Present).expect("set");
        let merged = reconcile(store.attendance(), &buf, &ctx(), "", today(), next_id());

        let res = commit(&mut store, &sink, merged, &ViewRegistry::default());
        match res {
            Err(CommitError::Persist(e)) => assert!(e.to_string().contains("disk full")),
            other => panic!("expected persist error, got {:?}", other),
        }
        assert!(store.attendance().is_empty());
        assert_eq!(buf.get("7"), Some(&AttendanceMark::Present));
    }

    #[test]
    fn commit_installs_records_and_refreshes_registered_views() {
        let mut store = RecordStore::default();
        let sink = MemorySink::default();
        let mut views = ViewRegistry::default();
        views.register("count", |s: &RecordStore| json!(s.attendance().len()));
        assert!(views.contains("count"));
        assert!(!views.contains("dashboard"));

        let mut buf = EditBuffer::for_roster(&roster(&["1", "2", "3"]));
        buf.set("1", AttendanceMark::Present).expect("set");
        buf.set("3", AttendanceMark::Absent).expect("set");
        let merged = reconcile(store.attendance(), &buf, &ctx(), "", today(), next_id());

        let done = commit(&mut store, &sink, merged, &views).expect("commit");
        assert_eq!(done.written, 2);
        assert_eq!(done.message, "2 records saved");
        assert_eq!(done.views.get("count"), Some(&json!(2)));
        assert_eq!(store.attendance().len(), 2);
        assert_eq!(sink.saved.borrow().len(), 2);
    }

    #[test]
    fn registering_a_name_twice_replaces_the_view() {
        let mut views = ViewRegistry::default();
        views.register("v", |_: &RecordStore| json!(1));
        views.register("v", |_: &RecordStore| json!(2));
        let out = views.refresh_all(&RecordStore::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("v"), Some(&json!(2)));
    }

    #[test]
    fn message_is_singular_for_one_row() {
        assert_eq!(saved_message(1), "1 record saved");
        assert_eq!(saved_message(3), "3 records saved");
    }
}
