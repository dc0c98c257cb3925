//! A live watch session: one accumulator, its tick timer, and its flushes.
//!
//! The ticker runs as a spawned task that exists only while the session is
//! playing. Flushes run as their own detached tasks so a slow store never
//! delays the ticker, and they are left to finish when the session is
//! dropped. Dropping the session cancels the ticker; seconds that were never
//! flushed are logged and lost.
//!
//! Each flush is booked on the recording day its seconds were counted in.
//! When that day changes mid-session the leftover seconds go to the old day
//! and the visible count restarts at zero.

use crate::accumulator::{Accumulator, FlushRequest, TimerCommand, Transition};
use crate::channels::{default_channel, find_channel, Channel};
use crate::models::{PlaybackState, SessionSnapshot};
use crate::sync::TimeLogSynchronizer;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

struct SessionInner {
    acc: Accumulator,
    channel: &'static Channel,
    day: NaiveDate,
    timer_generation: u64,
}

impl SessionInner {
    /// Moves the session onto `today`, returning the old day's unflushed seconds and that day.
    fn roll_to(&mut self, today: NaiveDate) -> Option<(FlushRequest, NaiveDate)> {
        if today <= self.day {
            return None;
        }
        let previous = std::mem::replace(&mut self.day, today);
        self.acc.roll_over().map(|flush| (flush, previous))
    }
}

struct Shared {
    inner: Mutex<SessionInner>,
    flush_done: Notify,
}

pub struct WatchSession {
    user: String,
    shared: Arc<Shared>,
    sync: TimeLogSynchronizer,
    tick: Duration,
    timer: Option<JoinHandle<()>>,
}

impl WatchSession {
    /// Opens a session seeded with today's durable total for `user`.
    ///
    /// A blank `user` yields a session that ignores every call.
    pub async fn start(user: &str, sync: TimeLogSynchronizer, tick: Duration) -> Self {
        let user = user.trim().to_string();
        let day = sync.today();
        let durable = match sync.today_total(&user).await {
            Ok(total) => total,
            Err(err) => {
                warn!(user = %user, "could not read today's total, counting from zero: {err}");
                0
            }
        };
        info!(user = %user, durable, "watch session opened");

        Self {
            user,
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner {
                    acc: Accumulator::new(durable),
                    channel: default_channel(),
                    day,
                    timer_generation: 0,
                }),
                flush_done: Notify::new(),
            }),
            sync,
            tick,
            timer: None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub async fn on_playback_state_change(&mut self, state: PlaybackState) {
        if self.user.is_empty() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let mut inner = shared.inner.lock().await;
        self.roll_day(&mut inner);
        let transition = inner.acc.transition(state);
        debug!(user = %self.user, ?state, "playback state changed");
        self.apply(&mut inner, transition);
    }

    /// Moves to another stream. Returns `None` for an unknown video id.
    pub async fn switch_channel(&mut self, video_id: &str) -> Option<&'static Channel> {
        let channel = find_channel(video_id)?;
        if self.user.is_empty() {
            return Some(channel);
        }
        let shared = Arc::clone(&self.shared);
        let mut inner = shared.inner.lock().await;
        inner.channel = channel;
        self.roll_day(&mut inner);
        let transition = inner.acc.switch_channel();
        info!(user = %self.user, video_id = channel.video_id, "switched channel");
        self.apply(&mut inner, transition);
        Some(channel)
    }

    pub async fn current_elapsed_seconds(&self) -> u64 {
        self.shared.inner.lock().await.acc.elapsed_seconds()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.shared.inner.lock().await;
        SessionSnapshot {
            user: self.user.clone(),
            state: inner.acc.state(),
            channel: inner.channel.video_id.to_string(),
            elapsed_seconds: inner.acc.elapsed_seconds(),
            last_flushed_seconds: inner.acc.last_flushed_value(),
            in_flight_seconds: inner.acc.in_flight_seconds(),
        }
    }

    /// Waits until no flush is in flight.
    pub async fn settle(&self) {
        loop {
            let done = self.shared.flush_done.notified();
            if self.shared.inner.lock().await.acc.in_flight_seconds() == 0 {
                return;
            }
            done.await;
        }
    }

    fn roll_day(&self, inner: &mut SessionInner) {
        if let Some((flush, day)) = inner.roll_to(self.sync.today()) {
            info!(user = %self.user, %day, seconds = flush.seconds, "recording day changed");
            spawn_flush(Arc::clone(&self.shared), self.sync.clone(), self.user.clone(), flush, day);
        }
    }

    fn apply(&mut self, inner: &mut SessionInner, transition: Transition) {
        // A bumped generation makes any ticker that survives its abort exit on its next tick.
        inner.timer_generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if transition.timer == TimerCommand::Start {
            self.timer = Some(tokio::spawn(run_ticker(
                Arc::clone(&self.shared),
                self.sync.clone(),
                self.user.clone(),
                self.tick,
                inner.timer_generation,
            )));
        }
        if let Some(flush) = transition.flush {
            spawn_flush(
                Arc::clone(&self.shared),
                self.sync.clone(),
                self.user.clone(),
                flush,
                inner.day,
            );
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Ok(mut inner) = self.shared.inner.try_lock() {
            inner.timer_generation += 1;
            let lost = inner.acc.teardown();
            if lost > 0 {
                warn!(user = %self.user, lost_seconds = lost, "session closed with unflushed watch time");
            }
        } else {
            warn!(user = %self.user, "session closed while busy, unflushed watch time unknown");
        }
        info!(user = %self.user, "watch session closed");
    }
}

async fn run_ticker(
    shared: Arc<Shared>,
    sync: TimeLogSynchronizer,
    user: String,
    period: Duration,
    generation: u64,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let (rolled, flush) = {
            let mut inner = shared.inner.lock().await;
            if inner.timer_generation != generation {
                return;
            }
            let rolled = inner.roll_to(sync.today());
            let day = inner.day;
            (rolled, inner.acc.tick().map(|flush| (flush, day)))
        };
        if let Some((flush, day)) = &rolled {
            info!(user = %user, %day, seconds = flush.seconds, "recording day changed");
        }
        for (flush, day) in rolled.into_iter().chain(flush) {
            spawn_flush(Arc::clone(&shared), sync.clone(), user.clone(), flush, day);
        }
    }
}

fn spawn_flush(
    shared: Arc<Shared>,
    sync: TimeLogSynchronizer,
    user: String,
    flush: FlushRequest,
    day: NaiveDate,
) {
    tokio::spawn(async move {
        let outcome = sync.apply_delta_on(&user, flush.seconds, day, Utc::now()).await;
        {
            let mut inner = shared.inner.lock().await;
            match outcome {
                Ok(_) => inner.acc.confirm(&flush),
                Err(err) => {
                    warn!(
                        user = %user,
                        seconds = flush.seconds,
                        trigger = ?flush.trigger,
                        "flush failed, seconds kept for the next trigger: {err}"
                    );
                    inner.acc.fail(&flush);
                }
            }
        }
        shared.flush_done.notify_waiters();
    });
}
