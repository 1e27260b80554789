use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::machine::{InterviewSetup, SessionSnapshot};
use crate::interview::runtime::{InterviewRuntime, SessionHandle};
use crate::leveling::{LiveLevel, QuizLevel};
use crate::models::question::AnswerPayload;
use crate::performance::PerformanceTracker;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    pub user_id: String,
    pub setup: InterviewSetup,
    /// Explicit starting level; wins over `quiz_level`.
    #[serde(default)]
    pub starting_level: Option<LiveLevel>,
    /// Diagnostic quiz result, converted onto the live scale.
    #[serde(default)]
    pub quiz_level: Option<QuizLevel>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewResponse {
    pub interview_id: Uuid,
    pub snapshot: SessionSnapshot,
}

#[derive(Deserialize)]
pub struct DraftRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub setup: InterviewSetup,
}

async fn lookup(state: &AppState, id: Uuid) -> Result<SessionHandle, AppError> {
    state
        .interviews
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))
}

/// POST /api/v1/interviews
pub async fn handle_create_interview(
    State(state): State<AppState>,
    Json(req): Json<CreateInterviewRequest>,
) -> Result<(StatusCode, Json<CreateInterviewResponse>), AppError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("userId cannot be empty".to_string()));
    }

    let mut setup = req.setup;
    setup.starting_level = req
        .starting_level
        .or(req.quiz_level.map(LiveLevel::from))
        .or(setup.starting_level);
    setup.validate()?;

    let tracker = PerformanceTracker::load(state.profiles.clone(), user_id).await?;
    let handle = InterviewRuntime::spawn(tracker, state.audio.coordinator(), state.questions.clone());
    let interview_id = state.interviews.insert(user_id, handle.clone()).await?;

    match handle.start(setup).await {
        Ok(snapshot) => Ok((
            StatusCode::CREATED,
            Json(CreateInterviewResponse {
                interview_id,
                snapshot,
            }),
        )),
        Err(e) => {
            state.interviews.remove(interview_id).await;
            Err(e.into())
        }
    }
}

/// GET /api/v1/interviews/:id
pub async fn handle_get_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.snapshot()))
}

/// POST /api/v1/interviews/:id/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(answer): Json<AnswerPayload>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.answer(answer).await?))
}

/// POST /api/v1/interviews/:id/draft
pub async fn handle_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.draft(req.text).await?))
}

/// POST /api/v1/interviews/:id/listen
pub async fn handle_listen(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.listen().await?))
}

/// POST /api/v1/interviews/:id/stop-listening
pub async fn handle_stop_listening(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.stop_listening().await?))
}

/// POST /api/v1/interviews/:id/end
pub async fn handle_end(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.end().await?))
}

/// POST /api/v1/interviews/:id/reset
pub async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.reset().await?))
}

/// POST /api/v1/interviews/:id/start
pub async fn handle_start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StartRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(lookup(&state, id).await?.start(req.setup).await?))
}

/// DELETE /api/v1/interviews/:id
pub async fn handle_delete_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .interviews
        .remove(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))?;
    Ok(StatusCode::NO_CONTENT)
}
