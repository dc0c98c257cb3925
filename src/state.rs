use crate::calendar::CalendarView;
use crate::config::Config;
use crate::session::WatchSession;
use crate::store::TimeLogStore;
use crate::sync::TimeLogSynchronizer;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

/// Everything one signed-in user has open: the player session and its calendar.
pub struct UserSession {
    pub watch: WatchSession,
    pub calendar: Arc<CalendarView>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TimeLogStore>,
    pub sync: TimeLogSynchronizer,
    pub sessions: Arc<Mutex<HashMap<String, UserSession>>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn TimeLogStore>) -> Self {
        let sync = TimeLogSynchronizer::new(Arc::clone(&store))
            .with_zone(config.zone)
            .with_mode(config.sync_mode, config.conflict_retries);
        Self {
            config: Arc::new(config),
            store,
            sync,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
