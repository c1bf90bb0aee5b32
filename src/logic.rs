//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Opening sessions (input validation, id allocation)
//!   - Recording attempts and reporting progress
//!   - Completing a session and recommending the next level
//!   - Recommending a level for a learner from their latest session
//!   - Level helpers (validity, next up/down)

use chrono::Utc;
use tracing::{info, instrument};

use crate::adapter::Recommendation;
use crate::domain::{is_valid_level, next_level_down, next_level_up, Attempt, Level, Session, Track};
use crate::error::{Result, SessionError};
use crate::protocol::{AttemptIn, CreateSessionIn, LevelOut, ProgressOut};
use crate::state::{AppState, NewSession};
use crate::stats::{learner_stats, session_stats, LearnerStats, SessionStats};
use crate::util::is_option_letter;

#[instrument(level = "info", skip(state, body), fields(learner_id = %body.learner_id, track = %body.track))]
pub async fn open_session(state: &AppState, body: CreateSessionIn) -> Result<Session> {
  let learner_id = body.learner_id.trim().to_string();
  if learner_id.is_empty() {
    return Err(SessionError::Invalid("learner_id must not be empty".into()));
  }
  let track: Track = body.track.parse()?;
  let level: Level = body.level.parse()?;

  let max = state.limits.max_exercises;
  if body.exercise_ids.is_empty() || body.exercise_ids.len() > max {
    return Err(SessionError::Invalid(format!(
      "exercise_ids must hold between 1 and {} ids (got {})",
      max,
      body.exercise_ids.len()
    )));
  }

  let new = NewSession { learner_id, track, level, exercise_ids: body.exercise_ids, profile: body.profile };
  Ok(state.create_session(new, Utc::now()).await)
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn session_with_stats(state: &AppState, session_id: &str) -> Result<(Session, SessionStats)> {
  let session = state
    .get_session(session_id)
    .await
    .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
  let stats = session_stats(&session);
  Ok((session, stats))
}

#[instrument(level = "info", skip(state, body), fields(%session_id, exercise_id = %body.exercise_id, correct = body.correct))]
pub async fn record_attempt(state: &AppState, session_id: &str, body: AttemptIn) -> Result<(Attempt, ProgressOut)> {
  if !is_option_letter(&body.option) {
    return Err(SessionError::Invalid(format!("option must be a single uppercase letter (got '{}')", body.option)));
  }
  if body.exercise_id.trim().is_empty() {
    return Err(SessionError::Invalid("exercise_id must not be empty".into()));
  }

  let attempt = Attempt {
    exercise_id: body.exercise_id,
    option: body.option,
    correct: body.correct,
    latency_secs: body.latency_secs,
    answered_at: Utc::now(),
  };
  let session = state.record_attempt(session_id, attempt.clone()).await?;
  let progress = progress_of(&session);
  info!(target: "session", %session_id, answered = progress.answered, total = progress.total, "Attempt recorded");
  Ok((attempt, progress))
}

pub fn progress_of(session: &Session) -> ProgressOut {
  let stats = session_stats(session);
  ProgressOut {
    answered: stats.completed,
    total: stats.exercise_count,
    correct: stats.correct,
    accuracy: stats.accuracy,
  }
}

/// Close the session, then run the engine on it. History excludes the session itself
/// so "recent improvement" compares against what came before.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn complete_session(
  state: &AppState,
  session_id: &str,
  ended_at: Option<chrono::DateTime<Utc>>,
) -> Result<(SessionStats, Recommendation)> {
  let (session, others) = state.complete_session(session_id, ended_at.unwrap_or_else(Utc::now)).await?;
  let stats = session_stats(&session);
  let history = history_of(&session.learner_id, &others);

  let rec = state.adapter.recommend_level(
    session.level.as_str(),
    Some(&stats),
    history.as_ref(),
    Some(&session.attempts),
  );
  info!(
    target: "adaptation",
    %session_id,
    current = %rec.current_level,
    recommended = %rec.recommended_level,
    direction = ?rec.direction,
    confidence = ?rec.confidence,
    "Session completed with recommendation"
  );
  Ok((stats, rec))
}

#[instrument(level = "info", skip(state), fields(%learner_id))]
pub async fn learner_stats_for(state: &AppState, learner_id: &str) -> LearnerStats {
  let sessions = state.sessions_for_learner(learner_id, None).await;
  learner_stats(learner_id, &sessions)
}

/// Recommendation from the learner's most recent session (optionally on one track).
/// Without an explicit `current_level`, the level of that session is used.
#[instrument(level = "info", skip(state), fields(%learner_id))]
pub async fn recommend_for_learner(
  state: &AppState,
  learner_id: &str,
  track: Option<&str>,
  current_level: Option<&str>,
) -> Result<(Option<String>, Recommendation)> {
  let track: Option<Track> = match track {
    Some(t) => Some(t.parse::<Track>()?),
    None => None,
  };

  let sessions = state.sessions_for_learner(learner_id, None).await;
  let latest = sessions.iter().find(|s| track.map_or(true, |t| s.track == t));

  let (stats, history) = match latest {
    Some(s) => {
      let others: Vec<Session> = sessions.iter().filter(|o| o.id != s.id).cloned().collect();
      (Some(session_stats(s)), history_of(learner_id, &others))
    }
    None => (None, None),
  };

  let level = current_level
    .map(str::to_string)
    .or_else(|| latest.map(|s| s.level.as_str().to_string()))
    .unwrap_or_else(|| Level::default().as_str().to_string());

  let rec = state.adapter.recommend_level(
    &level,
    stats.as_ref(),
    history.as_ref(),
    latest.map(|s| s.attempts.as_slice()),
  );
  Ok((latest.map(|s| s.id.clone()), rec))
}

pub fn level_info(name: &str) -> LevelOut {
  LevelOut {
    name: name.to_string(),
    valid: is_valid_level(name),
    next_up: next_level_up(name),
    next_down: next_level_down(name),
  }
}

/// Learner stats over the given sessions, or `None` when there are none to compare against.
fn history_of(learner_id: &str, others: &[Session]) -> Option<LearnerStats> {
  if others.is_empty() {
    None
  } else {
    Some(learner_stats(learner_id, others))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapter::{Confidence, Direction, ReasonCode};
  use crate::config::ServiceConfig;

  fn create_in(level: &str, n: usize) -> CreateSessionIn {
    CreateSessionIn {
      learner_id: "EST001".into(),
      track: "matematicas".into(),
      level: level.into(),
      exercise_ids: (1..=n).map(|i| format!("MAT_INT_{i:03}")).collect(),
      profile: serde_json::Value::Null,
    }
  }

  /// Answer to the `n`-th (0-based) exercise created by `create_in`.
  fn answer(n: usize, correct: bool, latency_secs: u32) -> AttemptIn {
    AttemptIn { exercise_id: format!("MAT_INT_{:03}", n + 1), option: "B".into(), correct, latency_secs }
  }

  #[tokio::test]
  async fn rejects_bad_session_requests() {
    let state = AppState::with_config(ServiceConfig::default());

    let mut body = create_in("intermedio", 3);
    body.learner_id = "  ".into();
    assert!(matches!(open_session(&state, body).await, Err(SessionError::Invalid(_))));

    assert!(matches!(open_session(&state, create_in("experto", 3)).await, Err(SessionError::Invalid(_))));
    assert!(matches!(open_session(&state, create_in("intermedio", 0)).await, Err(SessionError::Invalid(_))));
    assert!(matches!(open_session(&state, create_in("intermedio", 21)).await, Err(SessionError::Invalid(_))));

    let mut body = create_in("intermedio", 3);
    body.track = "historia".into();
    assert!(matches!(open_session(&state, body).await, Err(SessionError::Invalid(_))));
  }

  #[tokio::test]
  async fn rejects_malformed_options() {
    let state = AppState::with_config(ServiceConfig::default());
    let s = open_session(&state, create_in("intermedio", 3)).await.unwrap();
    let mut bad = answer(0, true, 10);
    bad.option = "ab".into();
    assert!(matches!(record_attempt(&state, &s.id, bad).await, Err(SessionError::Invalid(_))));
  }

  #[tokio::test]
  async fn stray_and_repeated_answers_do_not_count_toward_the_session() {
    let state = AppState::with_config(ServiceConfig::default());
    let s = open_session(&state, create_in("intermedio", 1)).await.unwrap();

    record_attempt(&state, &s.id, answer(0, true, 10)).await.unwrap();
    for _ in 0..5 {
      assert!(matches!(
        record_attempt(&state, &s.id, answer(0, true, 10)).await,
        Err(SessionError::AlreadyAnswered { .. })
      ));
      let mut stray = answer(0, true, 10);
      stray.exercise_id = "NOT_IN_SESSION".into();
      assert!(matches!(record_attempt(&state, &s.id, stray).await, Err(SessionError::Invalid(_))));
    }

    let (stats, rec) = complete_session(&state, &s.id, None).await.unwrap();
    assert_eq!(stats.exercise_count, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.completion_rate, 1.0);
    assert_eq!(rec.confidence, Confidence::Low);
    assert_eq!(rec.direction, Direction::Hold);
    assert_eq!(rec.recommended_level, Level::Intermediate);
  }

  #[tokio::test]
  async fn completing_a_strong_session_raises_the_level() {
    let state = AppState::with_config(ServiceConfig::default());
    let s = open_session(&state, create_in("basico", 10)).await.unwrap();
    for i in 0..10 {
      let (_, progress) = record_attempt(&state, &s.id, answer(i, i != 3, 25)).await.unwrap();
      assert_eq!(progress.answered, i + 1);
      assert_eq!(progress.total, 10);
    }

    let (stats, rec) = complete_session(&state, &s.id, None).await.unwrap();
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.correct, 9);
    assert_eq!(rec.confidence, Confidence::High);
    assert_eq!(rec.direction, Direction::Raise);
    assert_eq!(rec.recommended_level, Level::Intermediate);
    // Six in a row at the end, answered quickly.
    assert_eq!(rec.reason_code, ReasonCode::FastCorrectStreak);
    assert_eq!(rec.metrics.session_count, 0);
  }

  #[tokio::test]
  async fn completion_compares_against_prior_sessions() {
    let state = AppState::with_config(ServiceConfig::default());

    let first = open_session(&state, create_in("intermedio", 4)).await.unwrap();
    for (i, c) in [true, false, true, false].into_iter().enumerate() {
      record_attempt(&state, &first.id, answer(i, c, 50)).await.unwrap();
    }
    complete_session(&state, &first.id, None).await.unwrap();

    let second = open_session(&state, create_in("intermedio", 10)).await.unwrap();
    // 8/10: above the "good" bar, not above the raise bar.
    for (i, c) in [true, true, false, true, true, true, false, true, true, true].into_iter().enumerate() {
      record_attempt(&state, &second.id, answer(i, c, 50)).await.unwrap();
    }
    let (_, rec) = complete_session(&state, &second.id, None).await.unwrap();

    assert_eq!(rec.metrics.session_count, 1);
    assert_eq!(rec.metrics.historical_accuracy, 0.5);
    assert!(rec.metrics.recent_improvement);
    assert_eq!(rec.direction, Direction::Hold);
    assert_eq!(rec.reason_code, ReasonCode::ImprovingGoodAccuracy);
  }

  #[tokio::test]
  async fn learner_without_sessions_gets_a_conservative_lower() {
    let state = AppState::with_config(ServiceConfig::default());
    let (based_on, rec) = recommend_for_learner(&state, "EST404", None, Some("xyz")).await.unwrap();
    assert!(based_on.is_none());
    assert_eq!(rec.current_level, Level::Intermediate);
    assert_eq!(rec.direction, Direction::Lower);
    assert_eq!(rec.recommended_level, Level::Basic);
  }

  #[tokio::test]
  async fn recommendation_uses_latest_session_on_track() {
    let state = AppState::with_config(ServiceConfig::default());
    let s = open_session(&state, create_in("avanzado", 5)).await.unwrap();
    for i in 0..5 {
      record_attempt(&state, &s.id, answer(i, false, 70)).await.unwrap();
    }

    let (based_on, rec) = recommend_for_learner(&state, "EST001", Some("matematicas"), None).await.unwrap();
    assert_eq!(based_on.as_deref(), Some(s.id.as_str()));
    assert_eq!(rec.current_level, Level::Advanced);
    assert_eq!(rec.direction, Direction::Lower);
    assert_eq!(rec.reason_code, ReasonCode::IncorrectStreak);

    let (based_on, _) = recommend_for_learner(&state, "EST001", Some("verbal"), None).await.unwrap();
    assert!(based_on.is_none());

    assert!(recommend_for_learner(&state, "EST001", Some("arte"), None).await.is_err());
  }

  #[test]
  fn level_info_reports_neighbours() {
    let info = level_info("intermedio");
    assert!(info.valid);
    assert_eq!(info.next_up, Some(Level::Advanced));
    assert_eq!(info.next_down, Some(Level::Basic));

    let info = level_info("nope");
    assert!(!info.valid);
    assert_eq!(info.next_up, None);
    assert_eq!(info.next_down, None);
  }
}
