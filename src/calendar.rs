//! Month view of daily watch totals, kept in step with the store's change feed.

use crate::config::ReloadPolicy;
use crate::errors::StoreError;
use crate::models::{CalendarResponse, LogChange};
use crate::store::{FeedEvent, TimeLogStore};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub type MonthlyTotals = BTreeMap<NaiveDate, u64>;

/// First and last day of `month` (1-based), or `None` for an invalid month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next - Duration::days(1)))
}

pub async fn monthly_totals(
    store: &dyn TimeLogStore,
    user: &str,
    year: i32,
    month: u32,
) -> Result<MonthlyTotals, StoreError> {
    let Some((first, last)) = month_bounds(year, month) else {
        return Ok(MonthlyTotals::new());
    };
    let rows = store.read_range(user, first, last).await?;
    Ok(rows.into_iter().map(|row| (row.date, row.total_seconds)).collect())
}

pub fn to_response(user: &str, year: i32, month: u32, days: MonthlyTotals) -> CalendarResponse {
    CalendarResponse {
        user: user.to_string(),
        year,
        month,
        total_seconds: days.values().sum(),
        days,
    }
}

struct ViewState {
    user: String,
    year: i32,
    month: u32,
    totals: MonthlyTotals,
    last_error: Option<String>,
    started: u64,
    applied: u64,
}

impl ViewState {
    fn wants(&self, change: &LogChange, policy: ReloadPolicy) -> bool {
        match policy {
            ReloadPolicy::AnyChange => true,
            ReloadPolicy::OwnRows => {
                change.user == self.user
                    && change.date.year() == self.year
                    && change.date.month() == self.month
            }
        }
    }
}

struct Shared {
    store: Arc<dyn TimeLogStore>,
    state: Mutex<ViewState>,
    reloads: watch::Sender<u64>,
}

impl Shared {
    /// Re-reads the visible month. On failure the previous totals stay on screen.
    ///
    /// Reloads may overlap; a result is dropped when a reload that started
    /// later has already been applied.
    async fn reload(&self) {
        let (user, year, month, seq) = {
            let mut state = self.state.lock().await;
            state.started += 1;
            (state.user.clone(), state.year, state.month, state.started)
        };
        let outcome = monthly_totals(self.store.as_ref(), &user, year, month).await;

        let mut state = self.state.lock().await;
        if state.user != user || state.year != year || state.month != month {
            // The view moved while we were reading; whoever moved it reloads.
            return;
        }
        if seq < state.applied {
            debug!(user = %user, seq, applied = state.applied, "dropping stale calendar read");
            return;
        }
        state.applied = seq;
        match outcome {
            Ok(totals) => {
                debug!(user = %user, year, month, days = totals.len(), "calendar reloaded");
                state.totals = totals;
                state.last_error = None;
            }
            Err(err) => {
                error!(user = %user, year, month, "calendar reload failed: {err}");
                state.last_error = Some(err.to_string());
            }
        }
        drop(state);
        self.reloads.send_modify(|count| *count += 1);
    }
}

/// A live month of totals for one user.
///
/// Mounting reads the month and subscribes to the store's change feed;
/// dropping the view unsubscribes.
pub struct CalendarView {
    shared: Arc<Shared>,
    policy: ReloadPolicy,
    watcher: Option<JoinHandle<()>>,
}

impl CalendarView {
    pub async fn mount(
        store: Arc<dyn TimeLogStore>,
        user: &str,
        year: i32,
        month: u32,
        policy: ReloadPolicy,
    ) -> Self {
        let (reloads, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            store,
            state: Mutex::new(ViewState {
                user: user.trim().to_string(),
                year,
                month,
                totals: MonthlyTotals::new(),
                last_error: None,
                started: 0,
                applied: 0,
            }),
            reloads,
        });
        let mut view = Self {
            shared,
            policy,
            watcher: None,
        };
        view.subscribe();
        view.shared.reload().await;
        view
    }

    pub async fn set_month(&self, year: i32, month: u32) {
        {
            let mut state = self.shared.state.lock().await;
            if state.year == year && state.month == month {
                return;
            }
            state.year = year;
            state.month = month;
            state.totals.clear();
        }
        self.shared.reload().await;
    }

    /// Points the view at another user, replacing the change-feed subscription.
    pub async fn set_user(&mut self, user: &str) {
        self.unsubscribe();
        {
            let mut state = self.shared.state.lock().await;
            state.user = user.trim().to_string();
            state.totals.clear();
        }
        self.subscribe();
        self.shared.reload().await;
    }

    pub async fn monthly_totals(&self) -> MonthlyTotals {
        self.shared.state.lock().await.totals.clone()
    }

    pub async fn response(&self) -> CalendarResponse {
        let state = self.shared.state.lock().await;
        to_response(&state.user, state.year, state.month, state.totals.clone())
    }

    pub async fn last_error(&self) -> Option<String> {
        self.shared.state.lock().await.last_error.clone()
    }

    /// Receives the running count of completed reloads.
    pub fn reloads(&self) -> watch::Receiver<u64> {
        self.shared.reloads.subscribe()
    }

    fn subscribe(&mut self) {
        let mut feed = self.shared.store.subscribe_changes();
        let shared = Arc::clone(&self.shared);
        let policy = self.policy;
        self.watcher = Some(tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                let wanted = match &event {
                    FeedEvent::Change(change) => shared.state.lock().await.wants(change, policy),
                    FeedEvent::Missed(_) => true,
                };
                if wanted {
                    shared.reload().await;
                }
            }
        }));
    }

    fn unsubscribe(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for CalendarView {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyWatchLog, LogWrite, Precondition};
    use crate::store::{ChangeFeed, FileStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    /// Range reads can be made slow (once) or failing; writes go straight through.
    struct ScriptedStore {
        inner: FileStore,
        slow_next_range: AtomicBool,
        fail_ranges: AtomicBool,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                inner: FileStore::in_memory(),
                slow_next_range: AtomicBool::new(false),
                fail_ranges: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl TimeLogStore for ScriptedStore {
        async fn read_log(&self, user: &str, date: NaiveDate) -> Result<Option<DailyWatchLog>, StoreError> {
            self.inner.read_log(user, date).await
        }

        async fn upsert_log(&self, write: LogWrite) -> Result<DailyWatchLog, StoreError> {
            self.inner.upsert_log(write).await
        }

        async fn read_range(
            &self,
            user: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<DailyWatchLog>, StoreError> {
            if self.fail_ranges.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("range read refused".into()));
            }
            let rows = self.inner.read_range(user, start, end).await;
            if self.slow_next_range.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(StdDuration::from_millis(300)).await;
            }
            rows
        }

        fn subscribe_changes(&self) -> ChangeFeed {
            self.inner.subscribe_changes()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn put(store: &FileStore, user: &str, day: NaiveDate, total: u64) {
        store
            .upsert_log(LogWrite {
                user: user.to_string(),
                date: day,
                total_seconds: total,
                last_updated: Utc::now(),
                precondition: Precondition::Any,
            })
            .await
            .unwrap();
    }

    async fn next_reload(rx: &mut watch::Receiver<u64>) -> u64 {
        timeout(StdDuration::from_secs(2), rx.changed())
            .await
            .expect("reload timed out")
            .unwrap();
        *rx.borrow_and_update()
    }

    #[test]
    fn month_bounds_cover_whole_month() {
        assert_eq!(month_bounds(2024, 2), Some((date(2024, 2, 1), date(2024, 2, 29))));
        assert_eq!(month_bounds(2026, 12), Some((date(2026, 12, 1), date(2026, 12, 31))));
        assert_eq!(month_bounds(2026, 13), None);
        assert_eq!(month_bounds(2026, 0), None);
    }

    #[tokio::test]
    async fn monthly_totals_only_include_the_month() {
        let store = FileStore::in_memory();
        put(&store, "a", date(2026, 1, 31), 10).await;
        put(&store, "a", date(2026, 2, 1), 20).await;
        put(&store, "a", date(2026, 2, 28), 30).await;
        put(&store, "a", date(2026, 3, 1), 40).await;

        let totals = monthly_totals(&store, "a", 2026, 2).await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&date(2026, 2, 1)], 20);
        assert_eq!(totals[&date(2026, 2, 28)], 30);
        assert!(monthly_totals(&store, "a", 2026, 14).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mount_reads_and_feed_keeps_view_fresh() {
        let store = Arc::new(FileStore::in_memory());
        put(&store, "a", date(2026, 2, 3), 15).await;

        let view = CalendarView::mount(store.clone(), "a", 2026, 2, ReloadPolicy::OwnRows).await;
        assert_eq!(view.monthly_totals().await[&date(2026, 2, 3)], 15);

        let mut reloads = view.reloads();
        reloads.borrow_and_update();
        put(&store, "a", date(2026, 2, 3), 40).await;
        next_reload(&mut reloads).await;
        assert_eq!(view.monthly_totals().await[&date(2026, 2, 3)], 40);
    }

    #[tokio::test]
    async fn any_change_policy_reloads_for_other_users() {
        let store = Arc::new(FileStore::in_memory());
        let view = CalendarView::mount(store.clone(), "a", 2026, 2, ReloadPolicy::AnyChange).await;
        let mut reloads = view.reloads();
        let before = *reloads.borrow_and_update();

        put(&store, "someone-else", date(2026, 2, 3), 15).await;
        assert_eq!(next_reload(&mut reloads).await, before + 1);
        assert!(view.monthly_totals().await.is_empty());
    }

    #[tokio::test]
    async fn own_rows_policy_ignores_other_users_and_months() {
        let store = Arc::new(FileStore::in_memory());
        let view = CalendarView::mount(store.clone(), "a", 2026, 2, ReloadPolicy::OwnRows).await;
        let mut reloads = view.reloads();
        let before = *reloads.borrow_and_update();

        put(&store, "someone-else", date(2026, 2, 3), 15).await;
        put(&store, "a", date(2026, 3, 3), 15).await;
        put(&store, "a", date(2026, 2, 4), 25).await;

        assert_eq!(next_reload(&mut reloads).await, before + 1);
        assert_eq!(view.monthly_totals().await.len(), 1);
    }

    #[tokio::test]
    async fn set_month_and_set_user_switch_the_range() {
        let store = Arc::new(FileStore::in_memory());
        put(&store, "a", date(2026, 2, 3), 15).await;
        put(&store, "a", date(2026, 3, 9), 30).await;
        put(&store, "b", date(2026, 3, 9), 45).await;

        let mut view = CalendarView::mount(store.clone(), "a", 2026, 2, ReloadPolicy::OwnRows).await;
        view.set_month(2026, 3).await;
        assert_eq!(view.monthly_totals().await[&date(2026, 3, 9)], 30);

        view.set_user("b").await;
        let response = view.response().await;
        assert_eq!(response.user, "b");
        assert_eq!(response.total_seconds, 45);
    }

    #[tokio::test]
    async fn dropping_the_view_unsubscribes() {
        let store = Arc::new(FileStore::in_memory());
        let view = CalendarView::mount(store.clone(), "a", 2026, 2, ReloadPolicy::AnyChange).await;
        let mut reloads = view.reloads();
        reloads.borrow_and_update();
        drop(view);

        put(&store, "a", date(2026, 2, 3), 15).await;
        // The sender lives in the dropped view, so the receiver sees a closed channel.
        let changed = timeout(StdDuration::from_millis(200), reloads.changed()).await;
        assert!(!matches!(changed, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn late_read_does_not_overwrite_newer_totals() {
        let store = Arc::new(ScriptedStore::new());
        put(&store.inner, "a", date(2026, 2, 3), 15).await;
        store.slow_next_range.store(true, Ordering::SeqCst);

        let mounting = tokio::spawn(CalendarView::mount(store.clone(), "a", 2026, 2, ReloadPolicy::OwnRows));
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        put(&store.inner, "a", date(2026, 2, 3), 40).await;

        let view = mounting.await.unwrap();
        assert_eq!(view.monthly_totals().await[&date(2026, 2, 3)], 40);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_totals() {
        let store = Arc::new(ScriptedStore::new());
        put(&store.inner, "a", date(2026, 2, 3), 15).await;
        let view = CalendarView::mount(store.clone(), "a", 2026, 2, ReloadPolicy::OwnRows).await;
        assert!(view.last_error().await.is_none());

        let mut reloads = view.reloads();
        reloads.borrow_and_update();
        store.fail_ranges.store(true, Ordering::SeqCst);
        put(&store.inner, "a", date(2026, 2, 3), 40).await;
        next_reload(&mut reloads).await;

        assert_eq!(view.monthly_totals().await[&date(2026, 2, 3)], 15);
        let err = view.last_error().await.expect("error recorded");
        assert!(err.contains("range read refused"));

        store.fail_ranges.store(false, Ordering::SeqCst);
        put(&store.inner, "a", date(2026, 2, 4), 5).await;
        next_reload(&mut reloads).await;

        assert_eq!(view.monthly_totals().await[&date(2026, 2, 3)], 40);
        assert!(view.last_error().await.is_none());
    }
}
