use crate::model::{
    parse_date, AttendanceMark, AttendanceRecord, Enrollment, Evaluation, GradeRecord, Student,
    Subject,
};
use crate::persist::RecordSink;
use crate::store::RecordStore;
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

pub const DB_FILE: &str = "rosterd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            course TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            course TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            PRIMARY KEY(student_id, subject_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_subject ON enrollments(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            title TEXT NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_subject ON evaluations(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            date TEXT NOT NULL,
            mark TEXT NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            updated_on TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, subject_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_subject_date ON attendance_records(subject_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            evaluation_id TEXT NOT NULL,
            value REAL NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            updated_on TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(evaluation_id) REFERENCES evaluations(id),
            UNIQUE(student_id, evaluation_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_evaluation ON grade_records(evaluation_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    info!(path = %db_path.display(), "workspace database ready");
    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn date_col(raw: String) -> rusqlite::Result<chrono::NaiveDate> {
    parse_date(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            anyhow!("bad date: {}", raw).into(),
        )
    })
}

fn mark_col(raw: String) -> rusqlite::Result<AttendanceMark> {
    AttendanceMark::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            anyhow!("bad attendance mark: {}", raw).into(),
        )
    })
}

/// Reads the whole workspace into memory.
pub fn load_store(conn: &Connection) -> anyhow::Result<RecordStore> {
    let mut stmt = conn.prepare("SELECT id, first_name, last_name, course FROM students")?;
    let students = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                course: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT id, name, course FROM subjects ORDER BY name, id")?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                course: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT student_id, subject_id FROM enrollments ORDER BY rowid")?;
    let enrollments = stmt
        .query_map([], |r| {
            Ok(Enrollment {
                student_id: r.get(0)?,
                subject_id: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt =
        conn.prepare("SELECT id, subject_id, title, date FROM evaluations ORDER BY date, id")?;
    let evaluations = stmt
        .query_map([], |r| {
            Ok(Evaluation {
                id: r.get(0)?,
                subject_id: r.get(1)?,
                title: r.get(2)?,
                date: date_col(r.get(3)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, student_id, subject_id, date, mark, note, updated_on
         FROM attendance_records ORDER BY rowid",
    )?;
    let attendance = stmt
        .query_map([], |r| {
            Ok(AttendanceRecord {
                id: r.get(0)?,
                student_id: r.get(1)?,
                subject_id: r.get(2)?,
                date: date_col(r.get(3)?)?,
                mark: mark_col(r.get(4)?)?,
                note: r.get(5)?,
                updated_on: date_col(r.get(6)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, student_id, evaluation_id, value, note, updated_on
         FROM grade_records ORDER BY rowid",
    )?;
    let grades = stmt
        .query_map([], |r| {
            Ok(GradeRecord {
                id: r.get(0)?,
                student_id: r.get(1)?,
                evaluation_id: r.get(2)?,
                value: r.get(3)?,
                note: r.get(4)?,
                updated_on: date_col(r.get(5)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        students = students.len(),
        attendance = attendance.len(),
        grades = grades.len(),
        "store loaded"
    );
    Ok(RecordStore {
        students,
        subjects,
        enrollments,
        evaluations,
        attendance,
        grades,
    })
}

pub fn insert_student(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students(id, first_name, last_name, course) VALUES(?, ?, ?, ?)",
        (&s.id, &s.first_name, &s.last_name, &s.course),
    )?;
    Ok(())
}

pub fn insert_subject(conn: &Connection, s: &Subject) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO subjects(id, name, course) VALUES(?, ?, ?)",
        (&s.id, &s.name, &s.course),
    )?;
    Ok(())
}

pub fn insert_evaluation(conn: &Connection, e: &Evaluation) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO evaluations(id, subject_id, title, date) VALUES(?, ?, ?, ?)",
        (&e.id, &e.subject_id, &e.title, e.date.to_string()),
    )?;
    Ok(())
}

pub fn set_enrolled(
    conn: &Connection,
    student_id: &str,
    subject_id: &str,
    enrolled: bool,
) -> anyhow::Result<()> {
    if enrolled {
        conn.execute(
            "INSERT OR IGNORE INTO enrollments(student_id, subject_id) VALUES(?, ?)",
            (student_id, subject_id),
        )?;
    } else {
        conn.execute(
            "DELETE FROM enrollments WHERE student_id = ? AND subject_id = ?",
            (student_id, subject_id),
        )?;
    }
    Ok(())
}

/// Record persistence over the workspace connection.
pub struct SqliteSink<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSink<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RecordSink<AttendanceRecord> for SqliteSink<'_> {
    fn save(&self, batch: &[AttendanceRecord]) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to start transaction")?;
        for r in batch {
            tx.execute(
                "INSERT INTO attendance_records(id, student_id, subject_id, date, mark, note, updated_on)
                 VALUES(?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, subject_id, date) DO UPDATE SET
                   mark = excluded.mark,
                   note = excluded.note,
                   updated_on = excluded.updated_on",
                (
                    &r.id,
                    &r.student_id,
                    &r.subject_id,
                    r.date.to_string(),
                    r.mark.as_str(),
                    &r.note,
                    r.updated_on.to_string(),
                ),
            )
            .with_context(|| format!("failed to save attendance for student {}", r.student_id))?;
        }
        tx.commit().context("failed to commit attendance")?;
        Ok(())
    }

    fn delete(&self, record_id: &str) -> anyhow::Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM attendance_records WHERE id = ?", [record_id])?;
        Ok(n > 0)
    }
}

impl RecordSink<GradeRecord> for SqliteSink<'_> {
    fn save(&self, batch: &[GradeRecord]) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to start transaction")?;
        for r in batch {
            tx.execute(
                "INSERT INTO grade_records(id, student_id, evaluation_id, value, note, updated_on)
                 VALUES(?, ?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, evaluation_id) DO UPDATE SET
                   value = excluded.value,
                   note = excluded.note,
                   updated_on = excluded.updated_on",
                (
                    &r.id,
                    &r.student_id,
                    &r.evaluation_id,
                    r.value,
                    &r.note,
                    r.updated_on.to_string(),
                ),
            )
            .with_context(|| format!("failed to save grade for student {}", r.student_id))?;
        }
        tx.commit().context("failed to commit grades")?;
        Ok(())
    }

    fn delete(&self, record_id: &str) -> anyhow::Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM grade_records WHERE id = ?", [record_id])?;
        Ok(n > 0)
    }
}
