use std::{env, path::PathBuf, str::FromStr, time::Duration};
use tracing::warn;

/// Which calendar day a flush is booked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingZone {
    Utc,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Writes carry the total they were computed from; the store rejects stale writes.
    CompareAndSwap,
    /// Unconditional write of `read + delta`. Concurrent writers can lose updates.
    ReadModifyWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPolicy {
    AnyChange,
    OwnRows,
}

impl FromStr for RecordingZone {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown time zone '{other}'")),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cas" => Ok(Self::CompareAndSwap),
            "rmw" => Ok(Self::ReadModifyWrite),
            other => Err(format!("unknown sync mode '{other}'")),
        }
    }
}

impl FromStr for ReloadPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::AnyChange),
            "own" => Ok(Self::OwnRows),
            other => Err(format!("unknown reload policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub tick: Duration,
    pub zone: RecordingZone,
    pub sync_mode: SyncMode,
    pub conflict_retries: u32,
    pub reload_policy: ReloadPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            data_path: PathBuf::from("data/time_logs.json"),
            tick: Duration::from_secs(1),
            zone: RecordingZone::Utc,
            sync_mode: SyncMode::CompareAndSwap,
            conflict_retries: 3,
            reload_policy: ReloadPolicy::OwnRows,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parse_or(&lookup, "PORT", defaults.port),
            data_path: lookup("APP_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            tick: Duration::from_millis(
                parse_or(&lookup, "WATCH_TICK_MILLIS", defaults.tick.as_millis() as u64).max(1),
            ),
            zone: parse_or(&lookup, "WATCH_TIMEZONE", defaults.zone),
            sync_mode: parse_or(&lookup, "WATCH_SYNC_MODE", defaults.sync_mode),
            conflict_retries: parse_or(&lookup, "WATCH_CONFLICT_RETRIES", defaults.conflict_retries),
            reload_policy: parse_or(&lookup, "CALENDAR_RELOAD", defaults.reload_policy),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(err) => {
                warn!("ignoring {key}={raw}: {err}");
                default
            }
        },
        None => default,
    }
}
