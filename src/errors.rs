use axum::http::StatusCode;
use chrono::NaiveDate;
use thiserror::Error;

/// Failures reported by a [`TimeLogStore`](crate::store::TimeLogStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write time logs: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode time logs: {0}")]
    Encode(#[from] serde_json::Error),
    /// The row changed between the read and the write of a read-modify-write.
    #[error("concurrent write to the log of {user} on {date}")]
    Conflict { user: String, date: NaiveDate },
    #[error("total of {user} on {date} cannot go from {current} down to {requested}")]
    Regression {
        user: String,
        date: NaiveDate,
        current: u64,
        requested: u64,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } | StoreError::Regression { .. } => Self {
                status: StatusCode::CONFLICT,
                message: err.to_string(),
            },
            other => Self::internal(other),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409() {
        let err = AppError::from(StoreError::Conflict {
            user: "a@example.com".into(),
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert!(err.message.contains("a@example.com"));
    }

    #[test]
    fn unavailable_maps_to_500() {
        let err = AppError::from(StoreError::Unavailable("offline".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "store unavailable: offline");
    }
}
