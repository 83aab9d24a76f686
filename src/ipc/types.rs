use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

use crate::model::Schedule;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The schedule currently being edited. `generation` is the staleness token:
/// `schedule.open` bumps it, every mutating method must quote it, so a
/// result produced for one date can never be applied after navigating to
/// another.
pub struct OpenSchedule {
    pub classroom_code: String,
    pub date: NaiveDate,
    pub schedule: Schedule,
    pub generation: u64,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub open: Option<OpenSchedule>,
    pub next_generation: u64,
}
