//! Question Service client: every call the engine makes to the remote
//! question bank goes through this module.
//!
//! Callers depend on the `QuestionService` trait; `HttpQuestionService` is the
//! production implementation. Failures surface as `QuestionServiceError` and
//! are converted to fallback content by the caller (see `fallback`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::leveling::LiveLevel;
use crate::models::question::{AnswerPayload, AssessmentQuestion, Question};

pub mod fallback;

const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum QuestionServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub role: String,
    pub mode: String,
    pub experience: String,
    pub level: LiveLevel,
    pub question_count: u32,
    /// Seconds.
    pub duration: u64,
    pub candidate_name: String,
    pub email: String,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestionQuery {
    pub role: String,
    pub level: LiveLevel,
    /// Omitted when the candidate has no session history yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub question_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub role: String,
    pub experience: String,
    pub level: LiveLevel,
}

impl SubmitAnswerRequest {
    /// Builds the wire body for `answer` to `question`. A selected choice is
    /// sent as its option text; an index with no matching option is sent as
    /// the number itself.
    pub fn new(
        question: &Question,
        answer: &AnswerPayload,
        role: &str,
        experience: &str,
        level: LiveLevel,
    ) -> Self {
        let (text, code) = match answer {
            AnswerPayload::Choice(index) => {
                let text = question
                    .choice_text(*index)
                    .map(str::to_string)
                    .unwrap_or_else(|| index.to_string());
                (Some(text), None)
            }
            AnswerPayload::Code(source) => (None, Some(source.clone())),
            AnswerPayload::Text(text) => (Some(text.clone()), None),
        };
        Self {
            question_id: question.id.clone(),
            text,
            code,
            role: role.to_string(),
            experience: experience.to_string(),
            level,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SubmitAnswerResponse {
    #[serde(default)]
    reply: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    #[serde(default)]
    pub courses: Vec<Value>,
    #[serde(default)]
    pub articles: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Port
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait QuestionService: Send + Sync {
    /// `POST /session`: returns the service-issued session id.
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<String, QuestionServiceError>;

    /// `GET /session/{id}/next`
    async fn next_question(
        &self,
        session_id: &str,
        query: &NextQuestionQuery,
    ) -> Result<Question, QuestionServiceError>;

    /// `POST /session/{id}/answer`: returns the interviewer's reply, if any.
    async fn submit_answer(
        &self,
        session_id: &str,
        request: &SubmitAnswerRequest,
    ) -> Result<Option<String>, QuestionServiceError>;

    /// `GET /session/{id}/recommendations`
    async fn recommendations(&self, session_id: &str) -> Result<Recommendations, QuestionServiceError>;

    /// `GET /assessment`
    async fn assessment(&self, query: &AssessmentQuery) -> Result<Vec<AssessmentQuestion>, QuestionServiceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpQuestionService {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_base: Duration,
}

impl HttpQuestionService {
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, QuestionServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            retry_base: DEFAULT_RETRY_BASE,
        })
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request built by `build`, retrying transport errors, 429 and
    /// 5xx with exponential backoff. Other non-2xx statuses fail immediately.
    async fn send<T, F>(&self, label: &str, build: F) -> Result<T, QuestionServiceError>
    where
        T: DeserializeOwned + Send,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut last_error: Option<QuestionServiceError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_base, attempt);
                warn!(
                    "Question service {label} attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(QuestionServiceError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 {
                last_error = Some(QuestionServiceError::RateLimited {
                    retries: self.max_retries,
                });
                continue;
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Question service {label} returned {}: {}", status, body);
                last_error = Some(QuestionServiceError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(QuestionServiceError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let body = response.text().await?;
            debug!("Question service {label} succeeded ({} bytes)", body.len());
            return Ok(serde_json::from_str(&body)?);
        }

        Err(last_error.unwrap_or(QuestionServiceError::RateLimited {
            retries: self.max_retries,
        }))
    }
}

#[async_trait]
impl QuestionService for HttpQuestionService {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<String, QuestionServiceError> {
        let url = self.url("/session");
        let response: CreateSessionResponse = self
            .send("create_session", || self.client.post(&url).json(request))
            .await?;
        Ok(response.session_id)
    }

    async fn next_question(
        &self,
        session_id: &str,
        query: &NextQuestionQuery,
    ) -> Result<Question, QuestionServiceError> {
        let url = self.url(&format!("/session/{session_id}/next"));
        let question: Question = self
            .send("next_question", || self.client.get(&url).query(query))
            .await?;
        Ok(question.normalized())
    }

    async fn submit_answer(
        &self,
        session_id: &str,
        request: &SubmitAnswerRequest,
    ) -> Result<Option<String>, QuestionServiceError> {
        let url = self.url(&format!("/session/{session_id}/answer"));
        let response: SubmitAnswerResponse = self
            .send("submit_answer", || self.client.post(&url).json(request))
            .await?;
        Ok(response.reply.filter(|r| !r.trim().is_empty()))
    }

    async fn recommendations(&self, session_id: &str) -> Result<Recommendations, QuestionServiceError> {
        let url = self.url(&format!("/session/{session_id}/recommendations"));
        self.send("recommendations", || self.client.get(&url)).await
    }

    async fn assessment(&self, query: &AssessmentQuery) -> Result<Vec<AssessmentQuestion>, QuestionServiceError> {
        let url = self.url("/assessment");
        let questions: Vec<AssessmentQuestion> = self
            .send("assessment", || self.client.get(&url).query(query))
            .await?;
        Ok(questions)
    }
}

/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::models::question::QuestionKind;

    async fn spawn_service(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str, max_retries: u32) -> HttpQuestionService {
        HttpQuestionService::new(base_url, Duration::from_secs(5), max_retries)
            .unwrap()
            .with_retry_base(Duration::from_millis(1))
    }

    fn create_request() -> CreateSessionRequest {
        CreateSessionRequest {
            role: "Backend Engineer".into(),
            mode: "technical".into(),
            experience: "3-5 years".into(),
            level: LiveLevel::Moderate,
            question_count: 5,
            duration: 900,
            candidate_name: "Sam".into(),
            email: "sam@example.com".into(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_session_sends_camel_case_body() {
        let seen = Arc::new(Mutex::new(None::<Value>));
        let router = Router::new()
            .route(
                "/session",
                post(|State(seen): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(json!({ "sessionId": "srv-42" }))
                }),
            )
            .with_state(seen.clone());
        let base = spawn_service(router).await;

        let id = client(&base, 0).create_session(&create_request()).await.unwrap();
        assert_eq!(id, "srv-42");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["candidateName"], "Sam");
        assert_eq!(body["questionCount"], 5);
        assert_eq!(body["level"], "moderate");
        assert_eq!(body["duration"], 900);
    }

    #[tokio::test]
    async fn test_next_question_query_and_clamping() {
        let seen = Arc::new(Mutex::new(Vec::<HashMap<String, String>>::new()));
        let router = Router::new()
            .route(
                "/session/:id/next",
                get(
                    |State(seen): State<Arc<Mutex<Vec<HashMap<String, String>>>>>,
                     Query(params): Query<HashMap<String, String>>| async move {
                        seen.lock().unwrap().push(params);
                        Json(json!({
                            "id": "q-9",
                            "kind": "multiple-choice",
                            "prompt": "Pick one",
                            "choices": ["a", "b"],
                            "correctIndex": 0,
                            "difficulty": 42
                        }))
                    },
                ),
            )
            .with_state(seen.clone());
        let base = spawn_service(router).await;
        let service = client(&base, 0);

        let question = service
            .next_question(
                "srv-1",
                &NextQuestionQuery {
                    role: "SRE".into(),
                    level: LiveLevel::Advanced,
                    recent_accuracy: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(question.kind, QuestionKind::MultipleChoice);
        assert_eq!(question.difficulty, 10);

        service
            .next_question(
                "srv-1",
                &NextQuestionQuery {
                    role: "SRE".into(),
                    level: LiveLevel::Advanced,
                    recent_accuracy: Some(0.75),
                },
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].get("role").map(String::as_str), Some("SRE"));
        assert_eq!(seen[0].get("level").map(String::as_str), Some("advanced"));
        assert!(!seen[0].contains_key("recentAccuracy"));
        assert_eq!(seen[1].get("recentAccuracy").map(String::as_str), Some("0.75"));
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/session/:id/recommendations",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))).into_response()
                    } else {
                        Json(json!({ "courses": [{ "title": "Rust in Action" }] })).into_response()
                    }
                }),
            )
            .with_state(hits.clone());
        let base = spawn_service(router).await;

        let recs = client(&base, 2).recommendations("srv-1").await.unwrap();
        assert_eq!(recs.courses.len(), 1);
        assert!(recs.articles.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/session",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_GATEWAY, "upstream down")
                }),
            )
            .with_state(hits.clone());
        let base = spawn_service(router).await;

        let err = client(&base, 2).create_session(&create_request()).await.unwrap_err();
        assert!(matches!(err, QuestionServiceError::Api { status: 502, .. }), "{err:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported() {
        let router = Router::new().route(
            "/assessment",
            get(|| async { StatusCode::TOO_MANY_REQUESTS }),
        );
        let base = spawn_service(router).await;

        let err = client(&base, 1)
            .assessment(&AssessmentQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QuestionServiceError::RateLimited { retries: 1 }), "{err:?}");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/session/:id/answer",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::NOT_FOUND, "no such session")
                }),
            )
            .with_state(hits.clone());
        let base = spawn_service(router).await;

        let question = Question::open_text("q-1", "Why Rust?", 3);
        let request = SubmitAnswerRequest::new(
            &question,
            &AnswerPayload::Text("Memory safety".into()),
            "Backend Engineer",
            "junior",
            LiveLevel::Simple,
        );
        let err = client(&base, 3).submit_answer("local-x", &request).await.unwrap_err();
        match err {
            QuestionServiceError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such session");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_parse_error() {
        let router = Router::new().route("/session", post(|| async { "not json" }));
        let base = spawn_service(router).await;

        let err = client(&base, 0).create_session(&create_request()).await.unwrap_err();
        assert!(matches!(err, QuestionServiceError::Parse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_http_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"), 0)
            .create_session(&create_request())
            .await
            .unwrap_err();
        assert!(matches!(err, QuestionServiceError::Http(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_empty_reply_is_none() {
        let router = Router::new().route(
            "/session/:id/answer",
            post(|| async { Json(json!({ "reply": "   " })) }),
        );
        let base = spawn_service(router).await;

        let question = Question::open_text("q-1", "Why Rust?", 3);
        let request = SubmitAnswerRequest::new(
            &question,
            &AnswerPayload::Text("Speed".into()),
            "Backend Engineer",
            "junior",
            LiveLevel::Simple,
        );
        let reply = client(&base, 0).submit_answer("srv-1", &request).await.unwrap();
        assert_eq!(reply, None);
    }

    #[test]
    fn test_choice_answer_is_sent_as_option_text() {
        let question = Question {
            id: "q-3".into(),
            kind: QuestionKind::MultipleChoice,
            prompt: "Which trait enables `?` conversion?".into(),
            choices: Some(vec!["From".into(), "Into".into(), "AsRef".into()]),
            correct_index: Some(0),
            reference_solution: None,
            difficulty: 4,
            language: None,
        };
        let request = SubmitAnswerRequest::new(
            &question,
            &AnswerPayload::Choice(0),
            "Backend Engineer",
            "senior",
            LiveLevel::Advanced,
        );
        assert_eq!(request.text.as_deref(), Some("From"));
        assert!(request.code.is_none());

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["questionId"], "q-3");
        assert!(body.get("code").is_none());
    }

    #[test]
    fn test_code_answer_uses_code_field() {
        let question = Question::open_text("q-4", "Implement fizzbuzz", 2);
        let request = SubmitAnswerRequest::new(
            &question,
            &AnswerPayload::Code("fn main() {}".into()),
            "Backend Engineer",
            "senior",
            LiveLevel::Moderate,
        );
        assert_eq!(request.code.as_deref(), Some("fn main() {}"));
        assert!(request.text.is_none());
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 33), base.saturating_mul(u32::MAX));
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
    }
}
