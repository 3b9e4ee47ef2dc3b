use crate::roster::Roster;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BufferError {
    #[error("student is not on this roster: {0}")]
    NotOnRoster(String),
}

/// Pending, unsaved values for the rows of one rendered roster.
///
/// Every roster row has an entry; `None` means the row is unset. Values are
/// never written anywhere until the buffer is reconciled and committed.
#[derive(Debug, Clone, PartialEq)]
pub struct EditBuffer<V> {
    rows: BTreeMap<String, Option<V>>,
}

impl<V: Clone> EditBuffer<V> {
    pub fn for_roster(roster: &Roster) -> Self {
        Self {
            rows: roster.ids().map(|id| (id.to_string(), None)).collect(),
        }
    }

    /// Overwrites the single pending value of one row.
    pub fn set(&mut self, student_id: &str, value: V) -> Result<(), BufferError> {
        let slot = self
            .rows
            .get_mut(student_id)
            .ok_or_else(|| BufferError::NotOnRoster(student_id.to_string()))?;
        *slot = Some(value);
        Ok(())
    }

    pub fn clear(&mut self, student_id: &str) -> Result<(), BufferError> {
        let slot = self
            .rows
            .get_mut(student_id)
            .ok_or_else(|| BufferError::NotOnRoster(student_id.to_string()))?;
        *slot = None;
        Ok(())
    }

    pub fn set_all(&mut self, value: V) {
        for slot in self.rows.values_mut() {
            *slot = Some(value.clone());
        }
    }

    pub fn get(&self, student_id: &str) -> Option<&V> {
        self.rows.get(student_id).and_then(|v| v.as_ref())
    }

    /// Rows holding a value, ordered by student id.
    pub fn pending(&self) -> impl Iterator<Item = (&str, &V)> {
        self.rows
            .iter()
            .filter_map(|(id, v)| v.as_ref().map(|v| (id.as_str(), v)))
    }

    pub fn pending_count(&self) -> usize {
        self.rows.values().filter(|v| v.is_some()).count()
    }
}
