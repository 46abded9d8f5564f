//! HTTP server for the browser UI
//!
//! Serves the single-page UI and a small JSON API:
//! - POST /api/sessions - Start a browser session
//! - POST /api/sessions/{id}/analyze - Upload material, stream progress (SSE)
//! - POST /api/sessions/{id}/ask - One Q&A turn
//! - POST /api/sessions/{id}/quiz - Generate a quiz question
//! - POST /api/sessions/{id}/quiz/check - Grade the selected option

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Json, Response,
    },
    routing::{delete, get, post},
    Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::ai_client::{CompletionClient, LlmError, OpenAiClient, TranscriptionRequest};
use crate::app_state::SessionStore;
use crate::digest::{DigestOptions, Digester};
use crate::material::pdf_extractor::PdfExtractReader;
use crate::material::video::FfmpegAudioExtractor;
use crate::material::{Extractor, UploadedFile};
use crate::pipeline::Analyzer;
use crate::qa::{AskOutcome, ConversationHistory, QaOptions, QaSession};
use crate::quiz::{check_answer, QuizGenerator, QuizItem, QuizOptions, NO_SELECTION_MESSAGE};
use crate::settings::{QaContext, Settings};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const INDEX_HTML: &str = include_str!("../static/index.html");

// ============================================================================
// AppState
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub analyzer: Arc<Analyzer>,
    pub qa: Arc<QaSession>,
    pub quiz: Arc<QuizGenerator>,
    pub qa_context: QaContext,
    pub start_time: Instant,
}

impl AppState {
    /// Wire components from explicit capabilities
    pub fn new(settings: &Settings, completion: Arc<dyn CompletionClient>, extractor: Extractor) -> Self {
        let t = &settings.tunables;
        let digester = Digester::new(
            completion.clone(),
            DigestOptions {
                model: t.chat_model.clone(),
                temperature: t.temperature,
                max_tokens: t.digest_max_tokens,
            },
        );
        let qa = QaSession::new(
            completion.clone(),
            QaOptions {
                model: t.chat_model.clone(),
                temperature: t.temperature,
                max_tokens: t.qa_max_tokens,
            },
        );
        let quiz = QuizGenerator::new(
            completion,
            QuizOptions {
                model: t.chat_model.clone(),
                temperature: t.temperature,
                max_tokens: t.quiz_max_tokens,
            },
        );

        Self {
            sessions: SessionStore::new(settings.session_ttl()),
            analyzer: Arc::new(Analyzer::new(extractor, digester)),
            qa: Arc::new(qa),
            quiz: Arc::new(quiz),
            qa_context: t.qa_context,
            start_time: Instant::now(),
        }
    }

    /// Production wiring: OpenAI-compatible backend, pdf-extract, ffmpeg
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let client = Arc::new(OpenAiClient::new(settings)?);
        let t = &settings.tunables;
        let extractor = Extractor::new(
            Arc::new(PdfExtractReader),
            Arc::new(FfmpegAudioExtractor::new(t.ffmpeg_path.clone())),
            client.clone(),
            TranscriptionRequest {
                model: t.transcription_model.clone(),
                prompt: Some(t.transcription_prompt.clone()).filter(|p| !p.is_empty()),
                language: t.transcription_language.clone(),
            },
        );
        Ok(Self::new(settings, client, extractor))
    }
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug)]
pub struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

fn not_found(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::NOT_FOUND, msg.into())
}

fn unknown_session(id: Uuid) -> AppError {
    not_found(format!("Unknown session {}", id))
}

/// Keeps the multipart error's own status, e.g. 413 past the body limit
fn upload_error(context: &str, e: MultipartError) -> AppError {
    AppError(e.status(), format!("{}: {}", context, e.body_text()))
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
}

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: ConversationHistory,
}

/// Quiz as shown to the browser; the answer stays on the server
#[derive(Serialize)]
struct QuizView {
    question: String,
    options: Vec<String>,
}

#[derive(Deserialize)]
struct CheckRequest {
    #[serde(default)]
    selected: Option<String>,
}

#[derive(Serialize)]
struct CheckResponse {
    result: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    sessions: usize,
    uptime_secs: u64,
}

// ============================================================================
// Handlers
// ============================================================================

// GET /
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// GET /api/health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        sessions: state.sessions.len().await,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// POST /api/sessions
async fn create_session_handler(State(state): State<AppState>) -> (StatusCode, Json<CreateSessionResponse>) {
    let session_id = state.sessions.create().await;
    (StatusCode::CREATED, Json(CreateSessionResponse { session_id }))
}

// DELETE /api/sessions/{id}
async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(unknown_session(id))
    }
}

/// Read the `file` part of the upload; an empty part means nothing was selected
async fn read_upload(multipart: &mut Multipart) -> Result<Option<UploadedFile>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error("Invalid upload", e))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error("Failed to read upload", e))?;
        if !name.is_empty() {
            upload = Some(UploadedFile::new(name, bytes));
        }
    }
    Ok(upload)
}

// POST /api/sessions/{id}/analyze
async fn analyze_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    if state.sessions.get(id).await.is_none() {
        return Err(unknown_session(id));
    }
    let upload = read_upload(&mut multipart).await?;

    let sessions = state.sessions.clone();
    let events = state.analyzer.analyze(upload).then(move |event| {
        let sessions = sessions.clone();
        async move {
            if let Some(result) = &event.result {
                sessions
                    .update(id, |s| {
                        s.material = result.material.clone();
                        s.digest = result.digest.clone();
                    })
                    .await;
            }
            Event::default().json_data(&event)
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// POST /api/sessions/{id}/ask
async fn ask_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskOutcome>, AppError> {
    let session = state.sessions.get(id).await.ok_or_else(|| unknown_session(id))?;

    let outcome = state
        .qa
        .ask(&req.question, &session.history, session.context(state.qa_context))
        .await;

    // append onto the session's current history, not the snapshot taken before
    // the model call, so a clear or another turn in the meantime is kept
    let new_turn = outcome.history.turns().get(session.history.len()).cloned();
    let history = state
        .sessions
        .update(id, |s| {
            if let Some(turn) = new_turn {
                s.history = s.history.with_turn(turn.question, turn.answer);
            }
            s.history.clone()
        })
        .await
        .ok_or_else(|| unknown_session(id))?;

    Ok(Json(AskOutcome { input: outcome.input, history }))
}

// DELETE /api/sessions/{id}/history
async fn clear_history_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError> {
    if !state.sessions.clear_history(id).await {
        return Err(unknown_session(id));
    }
    Ok(Json(HistoryResponse { history: ConversationHistory::new() }))
}

// POST /api/sessions/{id}/quiz
async fn quiz_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuizView>, AppError> {
    let session = state.sessions.get(id).await.ok_or_else(|| unknown_session(id))?;

    let item = state
        .quiz
        .generate(session.context(state.qa_context))
        .await
        .unwrap_or_else(|e| QuizItem::from_error(&e));

    let view = QuizView { question: item.question.clone(), options: item.options.clone() };
    state
        .sessions
        .update(id, |s| s.quiz = Some(item))
        .await
        .ok_or_else(|| unknown_session(id))?;

    Ok(Json(view))
}

// POST /api/sessions/{id}/quiz/check
async fn check_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, AppError> {
    let session = state.sessions.get(id).await.ok_or_else(|| unknown_session(id))?;

    let Some(selected) = req.selected.filter(|s| !s.is_empty()) else {
        return Ok(Json(CheckResponse { result: NO_SELECTION_MESSAGE.to_string() }));
    };
    let correct = session.quiz.map(|q| q.answer).unwrap_or_default();

    Ok(Json(CheckResponse { result: check_answer(&selected, &correct) }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/{id}", delete(delete_session_handler))
        .route("/api/sessions/{id}/analyze", post(analyze_handler))
        .route("/api/sessions/{id}/ask", post(ask_handler))
        .route("/api/sessions/{id}/history", delete(clear_history_handler))
        .route("/api/sessions/{id}/quiz", post(quiz_handler))
        .route("/api/sessions/{id}/quiz/check", post(check_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
