use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::audio::AudioError;
use crate::interview::{RegistryError, SessionError};
use crate::leveling::quiz::AssessmentError;
use crate::performance::{StoreError, TrackerError};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A capability the request needs is missing or refused (microphone,
    /// speech recognition).
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidState { .. } => AppError::InvalidState(e.to_string()),
            SessionError::InvalidSetup(msg) | SessionError::InvalidAnswer(msg) => {
                AppError::Validation(msg)
            }
            SessionError::Audio(audio) => audio.into(),
            SessionError::Closed => AppError::NotFound(e.to_string()),
        }
    }
}

impl From<AudioError> for AppError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::PermissionDenied | AudioError::Unsupported(_) => {
                AppError::UnprocessableEntity(e.to_string())
            }
            AudioError::InvalidState(_) => AppError::InvalidState(e.to_string()),
            AudioError::Device(_) => AppError::Internal(anyhow::anyhow!(e)),
        }
    }
}

impl From<TrackerError> for AppError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::InvalidState(_) => AppError::InvalidState(e.to_string()),
            TrackerError::Store(store) => AppError::Store(store),
            TrackerError::Leveling(_) => AppError::Internal(anyhow::anyhow!(e)),
        }
    }
}

impl From<AssessmentError> for AppError {
    fn from(e: AssessmentError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        AppError::Conflict(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, "INVALID_STATE", msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Profile store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::SessionPhase;

    #[test]
    fn test_session_errors_map_to_status() {
        let invalid: AppError = SessionError::InvalidState {
            phase: SessionPhase::Submitting,
            action: "submit an answer",
        }
        .into();
        assert_eq!(invalid.into_response().status(), StatusCode::CONFLICT);

        let setup: AppError = SessionError::InvalidSetup("role cannot be empty".into()).into();
        assert_eq!(setup.into_response().status(), StatusCode::BAD_REQUEST);

        let denied: AppError = SessionError::Audio(AudioError::PermissionDenied).into();
        assert_eq!(
            denied.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let closed: AppError = SessionError::Closed.into();
        assert_eq!(closed.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_busy_user_is_a_conflict() {
        let err: AppError = RegistryError::UserBusy("u-1".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
