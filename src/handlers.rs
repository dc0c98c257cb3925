use crate::calendar::{month_bounds, monthly_totals, to_response, CalendarView};
use crate::channels::{Channel, NEWS_CHANNELS};
use crate::errors::AppError;
use crate::models::{
    CalendarQuery, CalendarResponse, ChannelRequest, PlaybackRequest, PlaybackState, SessionRequest,
    SessionSnapshot, UserQuery,
};
use crate::session::WatchSession;
use crate::state::{AppState, UserSession};
use crate::ui::render_index;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    Json,
};
use chrono::Datelike;
use std::sync::Arc;
use tracing::info;

pub async fn index() -> Html<String> {
    Html(render_index(NEWS_CHANNELS))
}

pub async fn list_channels() -> Json<&'static [Channel]> {
    Json(NEWS_CHANNELS)
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let user = require_user(&payload.user)?;
    let today = state.sync.today();

    let watch = WatchSession::start(&user, state.sync.clone(), state.config.tick).await;
    let calendar = CalendarView::mount(
        Arc::clone(&state.store),
        &user,
        today.year(),
        today.month(),
        state.config.reload_policy,
    )
    .await;
    let snapshot = watch.snapshot().await;

    let mut sessions = state.sessions.lock().await;
    if sessions.insert(user.clone(), UserSession {
            watch,
            calendar: Arc::new(calendar),
        }).is_some() {
        info!(user = %user, "replaced existing session");
    }
    Ok(Json(snapshot))
}

pub async fn end_session(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, AppError> {
    let user = require_user(&query.user)?;
    let removed = state.sessions.lock().await.remove(&user);
    match removed {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(no_session(&user)),
    }
}

pub async fn playback(
    State(state): State<AppState>,
    Json(payload): Json<PlaybackRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let user = require_user(&payload.user)?;
    let next = match (payload.state, payload.code) {
        (Some(next), _) => next,
        (None, Some(code)) => PlaybackState::from_code(code)
            .ok_or_else(|| AppError::bad_request(format!("unknown player state code {code}")))?,
        (None, None) => return Err(AppError::bad_request("state or code is required")),
    };

    let mut sessions = state.sessions.lock().await;
    let session = sessions.get_mut(&user).ok_or_else(|| no_session(&user))?;
    session.watch.on_playback_state_change(next).await;
    Ok(Json(session.watch.snapshot().await))
}

pub async fn switch_channel(
    State(state): State<AppState>,
    Json(payload): Json<ChannelRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let user = require_user(&payload.user)?;
    let mut sessions = state.sessions.lock().await;
    let session = sessions.get_mut(&user).ok_or_else(|| no_session(&user))?;
    session
        .watch
        .switch_channel(&payload.video_id)
        .await
        .ok_or_else(|| AppError::bad_request(format!("unknown channel '{}'", payload.video_id)))?;
    Ok(Json(session.watch.snapshot().await))
}

pub async fn elapsed(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let user = require_user(&query.user)?;
    let sessions = state.sessions.lock().await;
    let session = sessions.get(&user).ok_or_else(|| no_session(&user))?;
    Ok(Json(session.watch.snapshot().await))
}

pub async fn calendar(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CalendarResponse>, AppError> {
    let user = require_user(&query.user)?;
    if month_bounds(query.year, query.month).is_none() {
        return Err(AppError::bad_request("month must be between 1 and 12"));
    }

    let view = state
        .sessions
        .lock()
        .await
        .get(&user)
        .map(|session| Arc::clone(&session.calendar));
    if let Some(view) = view {
        view.set_month(query.year, query.month).await;
        return Ok(Json(view.response().await));
    }

    let days = monthly_totals(state.store.as_ref(), &user, query.year, query.month).await?;
    Ok(Json(to_response(&user, query.year, query.month, days)))
}

fn require_user(raw: &str) -> Result<String, AppError> {
    let user = raw.trim();
    if user.is_empty() {
        return Err(AppError::bad_request("user is required"));
    }
    Ok(user.to_string())
}

fn no_session(user: &str) -> AppError {
    AppError::not_found(format!("no active session for {user}"))
}
