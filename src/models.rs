use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable watch-time total of one user on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWatchLog {
    pub user: String,
    pub date: NaiveDate,
    pub total_seconds: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLog {
    pub total_seconds: u64,
    pub last_updated: DateTime<Utc>,
}

/// On-disk layout: user -> date -> row.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppData {
    pub logs: BTreeMap<String, BTreeMap<NaiveDate, StoredLog>>,
}

impl AppData {
    pub fn get(&self, user: &str, date: NaiveDate) -> Option<DailyWatchLog> {
        let row = self.logs.get(user)?.get(&date)?;
        Some(DailyWatchLog {
            user: user.to_string(),
            date,
            total_seconds: row.total_seconds,
            last_updated: row.last_updated,
        })
    }
}

/// What a write expects to find in the row before it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Any,
    Absent,
    Total(u64),
}

#[derive(Debug, Clone)]
pub struct LogWrite {
    pub user: String,
    pub date: NaiveDate,
    pub total_seconds: u64,
    pub last_updated: DateTime<Utc>,
    pub precondition: Precondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// Row-level notification published on the store's change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChange {
    pub kind: ChangeKind,
    pub user: String,
    pub date: NaiveDate,
    pub total_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

impl PlaybackState {
    /// Maps the embedded player's numeric state codes.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 | 5 => Some(Self::Unstarted),
            0 => Some(Self::Ended),
            1 => Some(Self::Playing),
            2 => Some(Self::Paused),
            3 => Some(Self::Buffering),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackRequest {
    pub user: String,
    pub state: Option<PlaybackState>,
    pub code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    pub user: String,
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub user: String,
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user: String,
    pub state: PlaybackState,
    pub channel: String,
    pub elapsed_seconds: u64,
    pub last_flushed_seconds: u64,
    pub in_flight_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CalendarResponse {
    pub user: String,
    pub year: i32,
    pub month: u32,
    pub days: BTreeMap<NaiveDate, u64>,
    pub total_seconds: u64,
}
