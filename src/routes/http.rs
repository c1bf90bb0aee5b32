//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::SessionError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

impl IntoResponse for SessionError {
  fn into_response(self) -> Response {
    let status = match &self {
      SessionError::NotFound(_) => StatusCode::NOT_FOUND,
      SessionError::AlreadyCompleted(_) | SessionError::AlreadyAnswered { .. } => StatusCode::CONFLICT,
      SessionError::Invalid(_) => StatusCode::BAD_REQUEST,
    };
    warn!(target: "session", %status, error = %self, "Request failed");
    let body = ErrorOut { success: false, error: self.to_string(), code: self.code() };
    (status, Json(body)).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, sessions: state.session_count().await })
}

#[instrument(level = "info", skip(state, body), fields(learner_id = %body.learner_id, track = %body.track, level = %body.level))]
pub async fn http_create_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateSessionIn>,
) -> Result<impl IntoResponse, SessionError> {
  let session = open_session(&state, body).await?;
  let stats = crate::stats::session_stats(&session);
  info!(target: "session", id = %session.id, "HTTP session created");
  Ok((StatusCode::CREATED, Json(SessionOut { success: true, session, stats })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, SessionError> {
  let (session, stats) = session_with_stats(&state, &id).await?;
  Ok(Json(SessionOut { success: true, session, stats }))
}

#[instrument(level = "info", skip(state, body), fields(exercise_id = %body.exercise_id, correct = body.correct))]
pub async fn http_post_attempt(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AttemptIn>,
) -> Result<Json<AttemptOut>, SessionError> {
  let (attempt, progress) = record_attempt(&state, &id, body).await?;
  Ok(Json(AttemptOut { success: true, attempt, progress }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_complete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Option<Json<CompleteIn>>,
) -> Result<Json<CompleteOut>, SessionError> {
  let ended_at = body.and_then(|Json(b)| b.ended_at);
  let (stats, rec) = complete_session(&state, &id, ended_at).await?;
  info!(target: "session", %id, recommended = %rec.recommended_level, "HTTP session completed");
  Ok(Json(CompleteOut { success: true, session_id: id, stats, recommendation: rec.into() }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_learner_sessions(
  State(state): State<Arc<AppState>>,
  Path(learner_id): Path<String>,
  Query(q): Query<LearnerSessionsQuery>,
) -> impl IntoResponse {
  let sessions = state.sessions_for_learner(&learner_id, q.limit).await;
  Json(LearnerSessionsOut { success: true, learner_id, total: sessions.len(), sessions })
}

#[instrument(level = "info", skip(state))]
pub async fn http_learner_stats(
  State(state): State<Arc<AppState>>,
  Path(learner_id): Path<String>,
) -> impl IntoResponse {
  let stats = learner_stats_for(&state, &learner_id).await;
  Json(LearnerStatsOut { success: true, stats })
}

#[instrument(level = "info", skip(state), fields(track = ?q.track, current_level = ?q.current_level))]
pub async fn http_learner_recommendation(
  State(state): State<Arc<AppState>>,
  Path(learner_id): Path<String>,
  Query(q): Query<RecommendQuery>,
) -> Result<Json<RecommendOut>, SessionError> {
  let (based_on_session, rec) =
    recommend_for_learner(&state, &learner_id, q.track.as_deref(), q.current_level.as_deref()).await?;
  info!(target: "adaptation", %learner_id, based_on = ?based_on_session, recommended = %rec.recommended_level, "HTTP recommendation served");
  Ok(Json(RecommendOut { success: true, learner_id, based_on_session, recommendation: rec.into() }))
}

#[instrument(level = "info")]
pub async fn http_level_info(Path(name): Path<String>) -> impl IntoResponse {
  Json(level_info(&name))
}
