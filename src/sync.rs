use crate::config::{RecordingZone, SyncMode};
use crate::errors::StoreError;
use crate::models::{DailyWatchLog, LogWrite, Precondition};
use crate::store::TimeLogStore;
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Adds flushed seconds to a user's durable daily total.
#[derive(Clone)]
pub struct TimeLogSynchronizer {
    store: Arc<dyn TimeLogStore>,
    zone: RecordingZone,
    mode: SyncMode,
    conflict_retries: u32,
}

impl TimeLogSynchronizer {
    pub fn new(store: Arc<dyn TimeLogStore>) -> Self {
        Self {
            store,
            zone: RecordingZone::Utc,
            mode: SyncMode::CompareAndSwap,
            conflict_retries: 3,
        }
    }

    pub fn with_zone(mut self, zone: RecordingZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_mode(mut self, mode: SyncMode, conflict_retries: u32) -> Self {
        self.mode = mode;
        self.conflict_retries = conflict_retries;
        self
    }

    pub fn store(&self) -> &Arc<dyn TimeLogStore> {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        match self.zone {
            RecordingZone::Utc => Utc::now().date_naive(),
            RecordingZone::Local => Local::now().date_naive(),
        }
    }

    pub async fn apply_delta(&self, user: &str, seconds: u64) -> Result<Option<DailyWatchLog>, StoreError> {
        self.apply_delta_on(user, seconds, self.today(), Utc::now()).await
    }

    /// Returns `Ok(None)` without touching the store when there is nothing to add
    /// or no one to add it for.
    pub async fn apply_delta_on(
        &self,
        user: &str,
        seconds: u64,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<DailyWatchLog>, StoreError> {
        let user = user.trim();
        if user.is_empty() || seconds == 0 {
            return Ok(None);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let existing = self.store.read_log(user, date).await?;
            let (total, precondition) = match &existing {
                Some(row) => (row.total_seconds.saturating_add(seconds), Precondition::Total(row.total_seconds)),
                None => (seconds, Precondition::Absent),
            };
            let precondition = match self.mode {
                SyncMode::CompareAndSwap => precondition,
                SyncMode::ReadModifyWrite => Precondition::Any,
            };

            let write = LogWrite {
                user: user.to_string(),
                date,
                total_seconds: total,
                last_updated: now,
                precondition,
            };
            match self.store.upsert_log(write).await {
                Ok(row) => {
                    debug!(user, %date, seconds, total = row.total_seconds, "flushed watch time");
                    return Ok(Some(row));
                }
                Err(StoreError::Conflict { .. }) if attempt <= self.conflict_retries => {
                    warn!(user, %date, attempt, "time log changed underneath flush, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Durable total for today, used to seed a new session's counter.
    pub async fn today_total(&self, user: &str) -> Result<u64, StoreError> {
        let user = user.trim();
        if user.is_empty() {
            return Ok(0);
        }
        Ok(self
            .store
            .read_log(user, self.today())
            .await?
            .map(|row| row.total_seconds)
            .unwrap_or(0))
    }
}
