//! Per-session watch-time counter.
//!
//! The accumulator is a plain state machine: it is told about ticks and
//! playback transitions and answers with the timer action to take and the
//! flush to issue, if any. Time and I/O live in [`crate::session`].
//!
//! Seconds move through three buckets: unflushed, in flight, and flushed.
//! A flush request moves its seconds from unflushed to in flight; a
//! confirmation moves them to flushed and a failure moves them back to
//! unflushed, so the next trigger picks them up again.

use crate::models::PlaybackState;

/// Seconds of play between automatic flushes.
pub const BATCH_SECONDS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Boundary,
    Remainder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushRequest {
    pub id: u64,
    pub seconds: u64,
    pub trigger: FlushTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub timer: TimerCommand,
    pub flush: Option<FlushRequest>,
}

#[derive(Debug, Clone)]
pub struct Accumulator {
    state: PlaybackState,
    elapsed: u64,
    session_start: u64,
    /// Counter value when the current recording day began.
    day_base: u64,
    flushed: u64,
    in_flight: u64,
    next_id: u64,
}

impl Accumulator {
    /// Starts a counter at the durable total already recorded for today.
    pub fn new(durable_total: u64) -> Self {
        Self {
            state: PlaybackState::Unstarted,
            elapsed: durable_total,
            session_start: durable_total,
            day_base: 0,
            flushed: durable_total,
            in_flight: 0,
            next_id: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Seconds recorded for the current day, flushed or not.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed - self.day_base
    }

    pub fn last_flushed_value(&self) -> u64 {
        self.flushed.saturating_sub(self.day_base)
    }

    pub fn in_flight_seconds(&self) -> u64 {
        self.in_flight
    }

    pub fn unflushed_seconds(&self) -> u64 {
        self.elapsed - self.flushed - self.in_flight
    }

    pub fn transition(&mut self, next: PlaybackState) -> Transition {
        self.state = next;
        match next {
            PlaybackState::Playing => Transition {
                timer: TimerCommand::Start,
                flush: None,
            },
            PlaybackState::Paused
            | PlaybackState::Buffering
            | PlaybackState::Ended
            | PlaybackState::Unstarted => Transition {
                timer: TimerCommand::Stop,
                flush: self.request(FlushTrigger::Remainder),
            },
        }
    }

    /// Stops counting while the player loads another stream.
    pub fn switch_channel(&mut self) -> Transition {
        self.transition(PlaybackState::Buffering)
    }

    /// Ticks outside `Playing` come from a timer that was already cancelled and are ignored.
    pub fn tick(&mut self) -> Option<FlushRequest> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.elapsed += 1;
        if (self.elapsed - self.session_start) % BATCH_SECONDS == 0 {
            self.request(FlushTrigger::Boundary)
        } else {
            None
        }
    }

    pub fn confirm(&mut self, flush: &FlushRequest) {
        self.in_flight = self.in_flight.saturating_sub(flush.seconds);
        self.flushed += flush.seconds;
    }

    pub fn fail(&mut self, flush: &FlushRequest) {
        self.in_flight = self.in_flight.saturating_sub(flush.seconds);
    }

    /// Starts a new recording day without touching the playback state or the
    /// batch boundaries. Returns the previous day's unflushed seconds, which
    /// the caller books on that day.
    pub fn roll_over(&mut self) -> Option<FlushRequest> {
        let flush = self.request(FlushTrigger::Remainder);
        self.day_base = self.elapsed;
        flush
    }

    /// Ends the session. Returns the seconds that were never flushed.
    pub fn teardown(&mut self) -> u64 {
        self.state = PlaybackState::Ended;
        self.unflushed_seconds()
    }

    fn request(&mut self, trigger: FlushTrigger) -> Option<FlushRequest> {
        let seconds = self.unflushed_seconds();
        if seconds == 0 {
            return None;
        }
        self.in_flight += seconds;
        self.next_id += 1;
        Some(FlushRequest {
            id: self.next_id,
            seconds,
            trigger,
        })
    }
}
