use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/channels", get(handlers::list_channels))
        .route("/api/session", post(handlers::start_session).delete(handlers::end_session))
        .route("/api/playback", post(handlers::playback))
        .route("/api/channel", post(handlers::switch_channel))
        .route("/api/elapsed", get(handlers::elapsed))
        .route("/api/calendar", get(handlers::calendar))
        .with_state(state)
}
