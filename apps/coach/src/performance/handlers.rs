use axum::{
    extract::{Path, State},
    Json,
};

use crate::errors::AppError;
use crate::performance::tracker::{PerformanceStats, PerformanceTracker};
use crate::state::AppState;

/// GET /api/v1/users/:user_id/stats
pub async fn handle_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PerformanceStats>, AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id cannot be empty".to_string()));
    }
    let tracker = PerformanceTracker::load(state.profiles.clone(), &user_id).await?;
    Ok(Json(tracker.stats()))
}
