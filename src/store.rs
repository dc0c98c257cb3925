//! Persistent store of daily watch totals.
//!
//! [`TimeLogStore`] is the seam the rest of the crate talks to: point reads,
//! conditional upserts, range reads, and a push feed of row changes.
//! [`FileStore`] keeps every row in memory and writes the whole table to a
//! JSON file after each change.

use crate::errors::StoreError;
use crate::models::{AppData, ChangeKind, DailyWatchLog, LogChange, LogWrite, Precondition, StoredLog};
use crate::storage::{load_data, persist_data};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error};

const FEED_CAPACITY: usize = 256;

#[async_trait]
pub trait TimeLogStore: Send + Sync {
    async fn read_log(&self, user: &str, date: NaiveDate) -> Result<Option<DailyWatchLog>, StoreError>;

    /// Inserts or replaces the row for `(write.user, write.date)`.
    ///
    /// Fails with [`StoreError::Conflict`] when the row does not match
    /// `write.precondition`, and with [`StoreError::Regression`] when the new
    /// total is lower than the stored one.
    async fn upsert_log(&self, write: LogWrite) -> Result<DailyWatchLog, StoreError>;

    /// Rows of `user` with `start <= date <= end`, ordered by date.
    async fn read_range(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyWatchLog>, StoreError>;

    fn subscribe_changes(&self) -> ChangeFeed;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Change(LogChange),
    /// The subscriber fell behind and this many events were dropped.
    Missed(u64),
}

/// Subscription to a store's change feed. Dropping it unsubscribes.
pub struct ChangeFeed {
    rx: broadcast::Receiver<LogChange>,
}

impl ChangeFeed {
    pub fn new(rx: broadcast::Receiver<LogChange>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        match self.rx.recv().await {
            Ok(change) => Some(FeedEvent::Change(change)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Some(FeedEvent::Missed(skipped)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn unsubscribe(self) {}
}

pub struct FileStore {
    data_path: Option<PathBuf>,
    data: Mutex<AppData>,
    changes: broadcast::Sender<LogChange>,
}

impl FileStore {
    /// Opens the store backed by `path`, starting empty if it is missing or unreadable.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let data = load_data(&path).await;
        Ok(Self::with_data(Some(path), data))
    }

    pub fn in_memory() -> Self {
        Self::with_data(None, AppData::default())
    }

    fn with_data(data_path: Option<PathBuf>, data: AppData) -> Self {
        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            data_path,
            data: Mutex::new(data),
            changes,
        }
    }
}

#[async_trait]
impl TimeLogStore for FileStore {
    async fn read_log(&self, user: &str, date: NaiveDate) -> Result<Option<DailyWatchLog>, StoreError> {
        let data = self.data.lock().await;
        Ok(data.get(user, date))
    }

    async fn upsert_log(&self, write: LogWrite) -> Result<DailyWatchLog, StoreError> {
        let mut data = self.data.lock().await;
        let previous = data.logs.get(&write.user).and_then(|days| days.get(&write.date)).cloned();

        let matches = match (write.precondition, &previous) {
            (Precondition::Any, _) => true,
            (Precondition::Absent, existing) => existing.is_none(),
            (Precondition::Total(expected), Some(row)) => row.total_seconds == expected,
            (Precondition::Total(_), None) => false,
        };
        if !matches {
            return Err(StoreError::Conflict {
                user: write.user,
                date: write.date,
            });
        }
        if let Some(row) = &previous {
            if write.total_seconds < row.total_seconds {
                return Err(StoreError::Regression {
                    user: write.user,
                    date: write.date,
                    current: row.total_seconds,
                    requested: write.total_seconds,
                });
            }
        }

        data.logs.entry(write.user.clone()).or_default().insert(
            write.date,
            StoredLog {
                total_seconds: write.total_seconds,
                last_updated: write.last_updated,
            },
        );

        if let Some(path) = &self.data_path {
            if let Err(err) = persist_data(path, &data).await {
                error!("failed to persist time logs: {err}");
                let days = data.logs.entry(write.user.clone()).or_default();
                match previous {
                    Some(row) => {
                        days.insert(write.date, row);
                    }
                    None => {
                        days.remove(&write.date);
                        if days.is_empty() {
                            data.logs.remove(&write.user);
                        }
                    }
                }
                return Err(err);
            }
        }
        drop(data);

        let kind = if previous.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        debug!(user = %write.user, date = %write.date, total = write.total_seconds, ?kind, "time log written");
        let _ = self.changes.send(LogChange {
            kind,
            user: write.user.clone(),
            date: write.date,
            total_seconds: write.total_seconds,
        });

        Ok(DailyWatchLog {
            user: write.user,
            date: write.date,
            total_seconds: write.total_seconds,
            last_updated: write.last_updated,
        })
    }

    async fn read_range(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyWatchLog>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let data = self.data.lock().await;
        let Some(days) = data.logs.get(user) else {
            return Ok(Vec::new());
        };
        Ok(days
            .range(start..=end)
            .map(|(date, row)| DailyWatchLog {
                user: user.to_string(),
                date: *date,
                total_seconds: row.total_seconds,
                last_updated: row.last_updated,
            })
            .collect())
    }

    fn subscribe_changes(&self) -> ChangeFeed {
        ChangeFeed::new(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn write(user: &str, date: NaiveDate, total: u64, precondition: Precondition) -> LogWrite {
        LogWrite {
            user: user.to_string(),
            date,
            total_seconds: total,
            last_updated: Utc::now(),
            precondition,
        }
    }

    #[tokio::test]
    async fn absent_precondition_inserts_once() {
        let store = FileStore::in_memory();
        store.upsert_log(write("a", day(1), 15, Precondition::Absent)).await.unwrap();

        let err = store
            .upsert_log(write("a", day(1), 30, Precondition::Absent))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.read_log("a", day(1)).await.unwrap().unwrap().total_seconds, 15);
    }

    #[tokio::test]
    async fn stale_total_is_rejected() {
        let store = FileStore::in_memory();
        store.upsert_log(write("a", day(1), 15, Precondition::Absent)).await.unwrap();
        store.upsert_log(write("a", day(1), 20, Precondition::Total(15))).await.unwrap();

        let err = store
            .upsert_log(write("a", day(1), 30, Precondition::Total(15)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn totals_never_decrease() {
        let store = FileStore::in_memory();
        store.upsert_log(write("a", day(1), 40, Precondition::Any)).await.unwrap();
        let err = store
            .upsert_log(write("a", day(1), 10, Precondition::Any))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Regression { current: 40, requested: 10, .. }));
    }

    #[tokio::test]
    async fn range_is_inclusive_and_scoped_to_user() {
        let store = FileStore::in_memory();
        for d in [1, 5, 9, 31] {
            store.upsert_log(write("a", day(d), u64::from(d), Precondition::Any)).await.unwrap();
        }
        store.upsert_log(write("b", day(5), 99, Precondition::Any)).await.unwrap();

        let rows = store.read_range("a", day(5), day(31)).await.unwrap();
        let dates: Vec<_> = rows.iter().map(|row| row.date).collect();
        assert_eq!(dates, vec![day(5), day(9), day(31)]);
        assert!(rows.iter().all(|row| row.user == "a"));
        assert!(store.read_range("a", day(9), day(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn feed_reports_insert_then_update() {
        let store = FileStore::in_memory();
        let mut feed = store.subscribe_changes();

        store.upsert_log(write("a", day(2), 15, Precondition::Absent)).await.unwrap();
        store.upsert_log(write("a", day(2), 25, Precondition::Total(15))).await.unwrap();

        let first = feed.recv().await.unwrap();
        let second = feed.recv().await.unwrap();
        assert!(matches!(first, FeedEvent::Change(LogChange { kind: ChangeKind::Insert, total_seconds: 15, .. })));
        assert!(matches!(second, FeedEvent::Change(LogChange { kind: ChangeKind::Update, total_seconds: 25, .. })));
    }

    #[tokio::test]
    async fn rejected_writes_are_not_published() {
        let store = FileStore::in_memory();
        let mut feed = store.subscribe_changes();
        let _ = store.upsert_log(write("a", day(2), 15, Precondition::Total(3))).await;
        store.upsert_log(write("a", day(2), 5, Precondition::Any)).await.unwrap();

        let event = feed.recv().await.unwrap();
        assert!(matches!(event, FeedEvent::Change(LogChange { total_seconds: 5, .. })));
    }

    #[tokio::test]
    async fn file_store_reloads_from_disk() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("watch_tracker_store_{}_{nanos}.json", std::process::id()));

        let store = FileStore::open(path.clone()).await.unwrap();
        store.upsert_log(write("a", day(3), 45, Precondition::Absent)).await.unwrap();
        drop(store);

        let reopened = FileStore::open(path.clone()).await.unwrap();
        assert_eq!(reopened.read_log("a", day(3)).await.unwrap().unwrap().total_seconds, 45);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn failed_persist_leaves_no_trace() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("watch_tracker_rollback_{}_{nanos}", std::process::id()));
        let store = FileStore::open(dir.join("logs.json")).await.unwrap();
        store.upsert_log(write("a", day(3), 15, Precondition::Absent)).await.unwrap();

        // Replace the data directory with a plain file so every later write fails.
        tokio::fs::remove_dir_all(&dir).await.unwrap();
        tokio::fs::write(&dir, b"blocker").await.unwrap();
        let mut feed = store.subscribe_changes();

        let update = store.upsert_log(write("a", day(3), 25, Precondition::Total(15))).await;
        assert!(matches!(update, Err(StoreError::Io(_))));
        let insert = store.upsert_log(write("b", day(3), 10, Precondition::Absent)).await;
        assert!(matches!(insert, Err(StoreError::Io(_))));

        assert_eq!(store.read_log("a", day(3)).await.unwrap().unwrap().total_seconds, 15);
        assert!(store.read_log("b", day(3)).await.unwrap().is_none());
        assert!(!store.data.lock().await.logs.contains_key("b"));
        assert!(feed.rx.try_recv().is_err());

        let _ = tokio::fs::remove_file(&dir).await;
    }
}
