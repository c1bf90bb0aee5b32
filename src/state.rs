//! Application state: the in-memory session store and the adaptation engine.
//!
//! This module owns:
//!   - sessions by id (attempts live inside their session)
//!   - the `LevelAdapter` built from configured thresholds
//!   - session limits from config
//!
//! Mutation goes through the write lock; readers get cloned snapshots so stats
//! and recommendations are always computed over a consistent attempt list.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::adapter::LevelAdapter;
use crate::config::{load_config_from_env, ServiceConfig, SessionLimits};
use crate::domain::{Attempt, Level, Session, SessionStatus, Track};
use crate::error::{Result, SessionError};

/// Fields a caller supplies to open a session. Validated by the service layer.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub learner_id: String,
    pub track: Track,
    pub level: Level,
    pub exercise_ids: Vec<String>,
    pub profile: serde_json::Value,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, Session>>>,
    pub adapter: LevelAdapter,
    pub limits: SessionLimits,
}

impl AppState {
    /// Build state from env: load optional TOML config, fall back to defaults.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_config_from_env().unwrap_or_default();
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: ServiceConfig) -> Self {
        let t = &cfg.thresholds;
        info!(
            target: "nivel_backend",
            lower_accuracy = t.lower_accuracy,
            hold_high_accuracy = t.hold_high_accuracy,
            raise_accuracy = t.raise_accuracy,
            fast_latency_secs = t.fast_latency_secs,
            min_correct_streak = t.min_correct_streak,
            min_incorrect_streak = t.min_incorrect_streak,
            max_exercises = cfg.sessions.max_exercises,
            "Adaptation thresholds in effect"
        );
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            adapter: LevelAdapter::new(cfg.thresholds),
            limits: cfg.sessions,
        }
    }

    /// Allocate an id and insert the session under a single write lock.
    #[instrument(level = "debug", skip(self, new), fields(learner_id = %new.learner_id, track = %new.track))]
    pub async fn create_session(&self, new: NewSession, now: DateTime<Utc>) -> Session {
        let mut sessions = self.sessions.write().await;
        let id = session_id_for(&new.learner_id, now, sessions.keys().map(String::as_str));
        let session = Session {
            id: id.clone(),
            learner_id: new.learner_id,
            track: new.track,
            level: new.level,
            exercise_ids: new.exercise_ids,
            attempts: Vec::new(),
            started_at: now,
            ended_at: None,
            status: SessionStatus::Started,
            profile: new.profile,
        };
        sessions.insert(id.clone(), session.clone());
        info!(target: "session", session_id = %id, level = %session.level, exercises = session.exercise_ids.len(), "Session created");
        session
    }

    /// Read-only access to a session by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Append an attempt. The first attempt moves the session to `InProgress`.
    /// Each planned exercise takes exactly one answer.
    #[instrument(level = "debug", skip(self, attempt), fields(%id, exercise_id = %attempt.exercise_id))]
    pub async fn record_attempt(&self, id: &str, attempt: Attempt) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if session.status == SessionStatus::Completed {
            warn!(target: "session", session_id = %id, "Attempt rejected: session already completed");
            return Err(SessionError::AlreadyCompleted(id.to_string()));
        }
        if !session.exercise_ids.contains(&attempt.exercise_id) {
            return Err(SessionError::Invalid(format!(
                "exercise '{}' is not part of session '{}'",
                attempt.exercise_id, id
            )));
        }
        if session.attempts.iter().any(|a| a.exercise_id == attempt.exercise_id) {
            warn!(target: "session", session_id = %id, exercise_id = %attempt.exercise_id, "Attempt rejected: exercise already answered");
            return Err(SessionError::AlreadyAnswered {
                session_id: id.to_string(),
                exercise_id: attempt.exercise_id,
            });
        }

        session.attempts.push(attempt);
        if session.status == SessionStatus::Started {
            session.status = SessionStatus::InProgress;
        }
        Ok(session.clone())
    }

    /// Mark completed and, under the same lock, snapshot the learner's other sessions.
    /// Idempotent: a second call keeps the first end timestamp.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn complete_session(&self, id: &str, ended_at: DateTime<Utc>) -> Result<(Session, Vec<Session>)> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if session.status != SessionStatus::Completed {
            session.status = SessionStatus::Completed;
            session.ended_at = Some(ended_at);
            info!(target: "session", session_id = %id, attempts = session.attempts.len(), "Session completed");
        }
        let done = session.clone();

        let history = sessions
            .values()
            .filter(|s| s.learner_id == done.learner_id && s.id != done.id)
            .cloned()
            .collect();
        Ok((done, history))
    }

    /// A learner's sessions, most recent first, optionally truncated.
    #[instrument(level = "debug", skip(self), fields(%learner_id))]
    pub async fn sessions_for_learner(&self, learner_id: &str, limit: Option<usize>) -> Vec<Session> {
        let mut out: Vec<Session> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.learner_id == learner_id)
                .cloned()
                .collect()
        };
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        if let Some(n) = limit {
            out.truncate(n);
        }
        out
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// `SES_<YYYYMMDD>_<learner>_<NNN>`, NNN = 1 + sessions that learner already opened that UTC day.
pub fn session_id_for<'a>(
    learner_id: &str,
    now: DateTime<Utc>,
    existing: impl Iterator<Item = &'a str>,
) -> String {
    let day = format!("SES_{}_", now.format("%Y%m%d"));
    let today = existing
        .filter_map(|id| id.strip_prefix(day.as_str()))
        .filter_map(|rest| rest.rsplit_once('_'))
        .filter(|(learner, nnn)| *learner == learner_id && !nnn.is_empty() && nnn.bytes().all(|b| b.is_ascii_digit()))
        .count();
    format!("{}{}_{:03}", day, learner_id, today + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::tests::attempt;
    use chrono::TimeZone;

    fn new_session(learner: &str) -> NewSession {
        NewSession {
            learner_id: learner.into(),
            track: Track::Mathematics,
            level: Level::Intermediate,
            exercise_ids: vec!["MAT_INT_001".into(), "MAT_INT_002".into()],
            profile: serde_json::json!({ "grado": "3-4" }),
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn session_ids_count_per_learner_and_day() {
        let existing = [
            "SES_20251117_EST001_001",
            "SES_20251117_EST001_002",
            "SES_20251116_EST001_001",
            "SES_20251117_EST0011_001",
        ];
        let id = session_id_for("EST001", at(17, 9), existing.iter().copied());
        assert_eq!(id, "SES_20251117_EST001_003");
        let id = session_id_for("EST002", at(17, 9), existing.iter().copied());
        assert_eq!(id, "SES_20251117_EST002_001");
    }

    #[test]
    fn session_ids_match_the_learner_segment_exactly() {
        let existing = ["SES_20251117_A_B_001", "SES_20251117_A_B_002", "SES_20251117_A_001"];
        assert_eq!(session_id_for("A", at(17, 9), existing.iter().copied()), "SES_20251117_A_002");
        assert_eq!(session_id_for("A_B", at(17, 9), existing.iter().copied()), "SES_20251117_A_B_003");
        assert_eq!(session_id_for("B", at(17, 9), existing.iter().copied()), "SES_20251117_B_001");
    }

    #[tokio::test]
    async fn attempts_must_target_unanswered_planned_exercises() {
        let state = AppState::with_config(ServiceConfig::default());
        let s = state.create_session(new_session("EST001"), at(17, 9)).await;

        let mut stray = attempt(true, 10);
        stray.exercise_id = "NOT_IN_SESSION".into();
        let err = state.record_attempt(&s.id, stray).await.unwrap_err();
        assert!(matches!(err, SessionError::Invalid(_)));

        state.record_attempt(&s.id, attempt(true, 10)).await.unwrap();
        let err = state.record_attempt(&s.id, attempt(false, 10)).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::AlreadyAnswered { session_id: s.id.clone(), exercise_id: "MAT_INT_001".into() }
        );

        let mut second = attempt(true, 10);
        second.exercise_id = "MAT_INT_002".into();
        let s = state.record_attempt(&s.id, second).await.unwrap();
        assert_eq!(s.attempts.len(), s.exercise_ids.len());
    }

    #[tokio::test]
    async fn completion_snapshots_other_sessions_of_the_learner() {
        let state = AppState::with_config(ServiceConfig::default());
        let earlier = state.create_session(new_session("EST001"), at(16, 9)).await;
        let _other_learner = state.create_session(new_session("EST002"), at(16, 9)).await;
        let current = state.create_session(new_session("EST001"), at(17, 9)).await;

        let (done, history) = state.complete_session(&current.id, at(17, 10)).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        let ids: Vec<&str> = history.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![earlier.id.as_str()]);

        let (again, _) = state.complete_session(&current.id, at(17, 11)).await.unwrap();
        assert_eq!(again.ended_at, Some(at(17, 10)));
    }

    #[tokio::test]
    async fn create_record_complete_lifecycle() {
        let state = AppState::with_config(ServiceConfig::default());
        let s = state.create_session(new_session("EST001"), at(17, 9)).await;
        assert_eq!(s.id, "SES_20251117_EST001_001");
        assert_eq!(s.status, SessionStatus::Started);

        let s = state.record_attempt(&s.id, attempt(true, 20)).await.unwrap();
        assert_eq!(s.status, SessionStatus::InProgress);
        assert_eq!(s.attempts.len(), 1);

        let (done, _) = state.complete_session(&s.id, at(17, 10)).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.ended_at, Some(at(17, 10)));

        let (again, _) = state.complete_session(&s.id, at(17, 11)).await.unwrap();
        assert_eq!(again.ended_at, Some(at(17, 10)));

        let err = state.record_attempt(&s.id, attempt(false, 20)).await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyCompleted(s.id.clone()));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = AppState::with_config(ServiceConfig::default());
        let err = state.record_attempt("nope", attempt(true, 1)).await.unwrap_err();
        assert_eq!(err, SessionError::NotFound("nope".into()));
        assert!(state.complete_session("nope", at(1, 0)).await.is_err());
        assert!(state.get_session("nope").await.is_none());
    }

    #[tokio::test]
    async fn learner_sessions_are_most_recent_first() {
        let state = AppState::with_config(ServiceConfig::default());
        let first = state.create_session(new_session("EST001"), at(15, 9)).await;
        let second = state.create_session(new_session("EST001"), at(17, 9)).await;
        let _other = state.create_session(new_session("EST002"), at(16, 9)).await;

        let list = state.sessions_for_learner("EST001", None).await;
        let ids: Vec<&str> = list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

        let limited = state.sessions_for_learner("EST001", Some(1)).await;
        assert_eq!(limited.len(), 1);
        assert_eq!(state.session_count().await, 3);
    }
}
