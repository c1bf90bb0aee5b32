//! Derived performance statistics.
//!
//! Nothing here is stored: session and learner stats are recomputed from the
//! attempt lists every time they are requested.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Attempt, Session, Track};

/// Aggregates for a single session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionStats {
  pub session_id: String,
  pub learner_id: String,
  pub track: Option<Track>,

  pub exercise_count: usize,
  pub completed: usize,
  pub correct: usize,
  pub incorrect: usize,

  /// correct / completed, 0 when nothing was answered.
  pub accuracy: f64,
  /// completed / exercise_count, 0 when the session has no exercises.
  pub completion_rate: f64,

  pub total_latency_secs: u64,
  pub mean_latency_secs: f64,
  pub min_latency_secs: Option<u32>,
  pub max_latency_secs: Option<u32>,

  pub started_at: Option<DateTime<Utc>>,
  pub ended_at: Option<DateTime<Utc>>,
}

/// Per-track slice of a learner's history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackStats {
  pub sessions: usize,
  /// Absent when the track has no answered attempts.
  pub accuracy: Option<f64>,
}

/// Aggregates across every session of one learner.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LearnerStats {
  pub learner_id: String,
  pub session_count: usize,
  pub total_completed: usize,
  pub total_correct: usize,
  pub mean_accuracy: f64,
  pub mean_latency_secs: f64,
  pub tracks: BTreeMap<Track, TrackStats>,
  pub last_session_id: Option<String>,
  pub last_session_at: Option<DateTime<Utc>>,
}

/// Run lengths of same-outcome answers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
  pub current_correct: usize,
  pub current_incorrect: usize,
  pub max_correct: usize,
  pub max_incorrect: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
  if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

pub fn session_stats(session: &Session) -> SessionStats {
  let attempts = &session.attempts;
  let completed = attempts.len();
  let correct = attempts.iter().filter(|a| a.correct).count();
  let total_latency_secs: u64 = attempts.iter().map(|a| a.latency_secs as u64).sum();

  SessionStats {
    session_id: session.id.clone(),
    learner_id: session.learner_id.clone(),
    track: Some(session.track),
    exercise_count: session.exercise_ids.len(),
    completed,
    correct,
    incorrect: completed - correct,
    accuracy: ratio(correct, completed),
    completion_rate: ratio(completed, session.exercise_ids.len()),
    total_latency_secs,
    mean_latency_secs: if completed == 0 { 0.0 } else { total_latency_secs as f64 / completed as f64 },
    min_latency_secs: attempts.iter().map(|a| a.latency_secs).min(),
    max_latency_secs: attempts.iter().map(|a| a.latency_secs).max(),
    started_at: Some(session.started_at),
    ended_at: session.ended_at,
  }
}

/// Learner-wide aggregates. `sessions` may be in any order; the most recent
/// session is picked by start time.
pub fn learner_stats(learner_id: &str, sessions: &[Session]) -> LearnerStats {
  let mut stats = LearnerStats {
    learner_id: learner_id.to_string(),
    session_count: sessions.len(),
    ..LearnerStats::default()
  };

  let mut total_latency: u64 = 0;
  // (sessions, answered, correct) per track
  let mut per_track: BTreeMap<Track, (usize, usize, usize)> = BTreeMap::new();

  for s in sessions {
    let correct = s.attempts.iter().filter(|a| a.correct).count();
    stats.total_completed += s.attempts.len();
    stats.total_correct += correct;
    total_latency += s.attempts.iter().map(|a| a.latency_secs as u64).sum::<u64>();

    let entry = per_track.entry(s.track).or_insert((0, 0, 0));
    entry.0 += 1;
    entry.1 += s.attempts.len();
    entry.2 += correct;
  }

  stats.mean_accuracy = ratio(stats.total_correct, stats.total_completed);
  stats.mean_latency_secs = if stats.total_completed == 0 {
    0.0
  } else {
    total_latency as f64 / stats.total_completed as f64
  };

  stats.tracks = per_track
    .into_iter()
    .map(|(track, (sessions, answered, correct))| {
      let accuracy = if answered == 0 { None } else { Some(ratio(correct, answered)) };
      (track, TrackStats { sessions, accuracy })
    })
    .collect();

  if let Some(last) = sessions.iter().max_by(|a, b| {
    a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id))
  }) {
    stats.last_session_id = Some(last.id.clone());
    stats.last_session_at = Some(last.started_at);
  }

  stats
}

/// Single forward scan. The running counters at the end are the trailing run.
pub fn streaks(attempts: &[Attempt]) -> Streaks {
  let mut s = Streaks::default();
  for a in attempts {
    if a.correct {
      s.current_correct += 1;
      s.current_incorrect = 0;
      s.max_correct = s.max_correct.max(s.current_correct);
    } else {
      s.current_incorrect += 1;
      s.current_correct = 0;
      s.max_incorrect = s.max_incorrect.max(s.current_incorrect);
    }
  }
  s
}
