use std::sync::Arc;

use crate::audio::AudioBackends;
use crate::config::Config;
use crate::interview::InterviewRegistry;
use crate::performance::ProfileStore;
use crate::question_client::QuestionService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Default: HttpQuestionService against QUESTION_SERVICE_URL.
    pub questions: Arc<dyn QuestionService>,
    /// Redis when REDIS_URL is set, JSON files under PROFILE_DIR otherwise.
    pub profiles: Arc<dyn ProfileStore>,
    pub interviews: Arc<InterviewRegistry>,
    /// Backends for each interview's audio coordinator. The server build is
    /// text-only; speech backends plug in here.
    pub audio: AudioBackends,
}
