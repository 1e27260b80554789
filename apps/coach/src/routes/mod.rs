pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers as interview;
use crate::leveling::handlers as leveling;
use crate::performance::handlers as performance;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Calibration
        .route("/api/v1/assessment", get(leveling::handle_get_assessment))
        .route(
            "/api/v1/assessment/score",
            post(leveling::handle_score_assessment),
        )
        // Interviews
        .route("/api/v1/interviews", post(interview::handle_create_interview))
        .route(
            "/api/v1/interviews/:id",
            get(interview::handle_get_interview).delete(interview::handle_delete_interview),
        )
        .route("/api/v1/interviews/:id/answer", post(interview::handle_answer))
        .route("/api/v1/interviews/:id/draft", post(interview::handle_draft))
        .route("/api/v1/interviews/:id/listen", post(interview::handle_listen))
        .route(
            "/api/v1/interviews/:id/stop-listening",
            post(interview::handle_stop_listening),
        )
        .route("/api/v1/interviews/:id/end", post(interview::handle_end))
        .route("/api/v1/interviews/:id/reset", post(interview::handle_reset))
        .route("/api/v1/interviews/:id/start", post(interview::handle_start))
        // Performance
        .route(
            "/api/v1/users/:user_id/stats",
            get(performance::handle_user_stats),
        )
        .with_state(state)
}
