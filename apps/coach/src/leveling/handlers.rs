use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::leveling::quiz::{QuizScore, SelfAssessment};
use crate::leveling::{LiveLevel, QuizLevel};
use crate::models::question::AssessmentQuestion;
use crate::question_client::fallback::fallback_assessment;
use crate::question_client::AssessmentQuery;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResponse {
    pub questions: Vec<AssessmentQuestion>,
    /// True when the built-in quiz was served instead of the service's.
    pub fallback: bool,
}

#[derive(Deserialize)]
pub struct ScoreRequest {
    pub questions: Vec<AssessmentQuestion>,
    /// Question id → selected option index.
    pub answers: HashMap<String, usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    pub quiz_level: QuizLevel,
    /// The quiz level converted onto the live scale.
    pub starting_level: LiveLevel,
    pub score: QuizScore,
}

/// GET /api/v1/assessment
pub async fn handle_get_assessment(
    State(state): State<AppState>,
    Query(query): Query<AssessmentQuery>,
) -> Json<AssessmentResponse> {
    let response = match state.questions.assessment(&query).await {
        Ok(questions) if !questions.is_empty() => AssessmentResponse {
            questions,
            fallback: false,
        },
        Ok(_) => {
            warn!("Question service returned an empty assessment; serving built-in quiz");
            AssessmentResponse {
                questions: fallback_assessment(),
                fallback: true,
            }
        }
        Err(e) => {
            warn!("Failed to fetch assessment ({e}); serving built-in quiz");
            AssessmentResponse {
                questions: fallback_assessment(),
                fallback: true,
            }
        }
    };
    Json(response)
}

/// POST /api/v1/assessment/score
pub async fn handle_score_assessment(
    Json(req): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, AppError> {
    let mut assessment = SelfAssessment::new(req.questions);
    for (question_id, index) in &req.answers {
        assessment.answer(question_id, *index)?;
    }
    let score = assessment.finish()?;

    Ok(Json(ScoreResponse {
        quiz_level: score.level,
        starting_level: score.level.into(),
        score,
    }))
}
