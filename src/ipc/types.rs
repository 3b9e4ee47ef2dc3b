use crate::persist::ViewRegistry;
use crate::session::SessionRegistry;
use crate::store::RecordStore;
use crate::views;
use rusqlite::Connection;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub store: RecordStore,
    pub sessions: SessionRegistry,
    pub attendance_views: ViewRegistry,
    pub grade_views: ViewRegistry,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            store: RecordStore::default(),
            sessions: SessionRegistry::default(),
            attendance_views: views::attendance_views(),
            grade_views: views::grade_views(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
