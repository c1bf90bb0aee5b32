//! Rule-based difficulty adaptation.
//!
//! `LevelAdapter::recommend_level` looks at whatever performance data is
//! available for a learner (current session stats, historical stats, the raw
//! attempt sequence) and recommends raising, holding or lowering the level.
//!
//! Flow:
//! 1) Extract a flat metrics snapshot, defaulting missing inputs to zero.
//! 2) Classify confidence from the number of answered exercises.
//! 3) Walk the decision table; first matching rule wins.
//! 4) Shift the level one step (clamped) in the chosen direction.
//!
//! The operation is total: missing stats and unknown level names never fail.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::domain::{Attempt, Level, LEVELS};
use crate::stats::{streaks, LearnerStats, SessionStats};
use crate::util::pct;

pub const LOWER_ACCURACY: f64 = 0.50;
pub const HOLD_HIGH_ACCURACY: f64 = 0.70;
pub const RAISE_ACCURACY: f64 = 0.80;
pub const FAST_LATENCY_SECS: f64 = 40.0;
pub const MIN_CORRECT_STREAK: usize = 5;
pub const MIN_INCORRECT_STREAK: usize = 3;
pub const HIGH_CONFIDENCE_MIN: usize = 10;
pub const MEDIUM_CONFIDENCE_MIN: usize = 5;

/// Decision thresholds. Defaults are the constants above; the service config
/// may override any of them.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
  /// Below this accuracy the level goes down.
  pub lower_accuracy: f64,
  /// Above this (and not above `raise_accuracy`) the level holds with a "good accuracy" reason.
  pub hold_high_accuracy: f64,
  /// Above this accuracy the level goes up.
  pub raise_accuracy: f64,
  /// Mean latency under this (and above zero) counts as fast.
  pub fast_latency_secs: f64,
  pub min_correct_streak: usize,
  pub min_incorrect_streak: usize,
  pub high_confidence_min: usize,
  pub medium_confidence_min: usize,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      lower_accuracy: LOWER_ACCURACY,
      hold_high_accuracy: HOLD_HIGH_ACCURACY,
      raise_accuracy: RAISE_ACCURACY,
      fast_latency_secs: FAST_LATENCY_SECS,
      min_correct_streak: MIN_CORRECT_STREAK,
      min_incorrect_streak: MIN_INCORRECT_STREAK,
      high_confidence_min: HIGH_CONFIDENCE_MIN,
      medium_confidence_min: MEDIUM_CONFIDENCE_MIN,
    }
  }
}

impl Thresholds {
  /// Reject overrides that would reorder or disable the decision table.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let accuracies = [
      ("lower_accuracy", self.lower_accuracy),
      ("hold_high_accuracy", self.hold_high_accuracy),
      ("raise_accuracy", self.raise_accuracy),
    ];
    for (name, v) in accuracies {
      if !v.is_finite() || !(0.0..=1.0).contains(&v) {
        return Err(ConfigError::Invalid(format!("{name} must be within [0, 1] (got {v})")));
      }
    }
    if !(self.lower_accuracy <= self.hold_high_accuracy && self.hold_high_accuracy <= self.raise_accuracy) {
      return Err(ConfigError::Invalid(format!(
        "accuracies must satisfy lower <= hold_high <= raise (got {} / {} / {})",
        self.lower_accuracy, self.hold_high_accuracy, self.raise_accuracy
      )));
    }
    if !self.fast_latency_secs.is_finite() || self.fast_latency_secs < 0.0 {
      return Err(ConfigError::Invalid(format!(
        "fast_latency_secs must be a non-negative number (got {})",
        self.fast_latency_secs
      )));
    }
    if self.min_correct_streak == 0 || self.min_incorrect_streak == 0 {
      return Err(ConfigError::Invalid("streak minimums must be at least 1".into()));
    }
    if self.medium_confidence_min > self.high_confidence_min {
      return Err(ConfigError::Invalid(format!(
        "medium_confidence_min ({}) exceeds high_confidence_min ({})",
        self.medium_confidence_min, self.high_confidence_min
      )));
    }
    Ok(())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
  #[serde(rename = "subir")]
  Raise,
  #[serde(rename = "mantener")]
  Hold,
  #[serde(rename = "bajar")]
  Lower,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
  #[serde(rename = "alta")]
  High,
  #[serde(rename = "media")]
  Medium,
  #[serde(rename = "baja")]
  Low,
}

/// Which rule produced the decision. The human readable sentence is rendered from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
  LowAccuracySparseData,
  InsufficientData,
  IncorrectStreak,
  LowAccuracy,
  FastCorrectStreak,
  CorrectStreak,
  FastHighAccuracy,
  HighAccuracy,
  ImprovingGoodAccuracy,
  GoodAccuracy,
  AdequateAccuracy,
}

impl ReasonCode {
  pub fn render(self, m: &Metrics, primary_accuracy: f64) -> String {
    let acc = pct(primary_accuracy);
    let latency = m.session_mean_latency;
    match self {
      ReasonCode::LowAccuracySparseData =>
        format!("Low accuracy ({acc}) despite sparse data. Lowering the level."),
      ReasonCode::InsufficientData =>
        format!("Insufficient data ({} exercises). Keeping the current level.", m.total_exercises),
      ReasonCode::IncorrectStreak =>
        format!("{} incorrect answers in a row. The current level is too hard.", m.max_incorrect_streak),
      ReasonCode::LowAccuracy =>
        format!("Low accuracy ({acc}). The current level is too hard."),
      ReasonCode::FastCorrectStreak =>
        format!("{} correct answers in a row with fast responses ({latency:.0}s). The current level is too easy.", m.max_correct_streak),
      ReasonCode::CorrectStreak =>
        format!("{} correct answers in a row. The current level is easy.", m.max_correct_streak),
      ReasonCode::FastHighAccuracy =>
        format!("Excellent accuracy ({acc}) with fast responses ({latency:.0}s). The current level is too easy."),
      ReasonCode::HighAccuracy =>
        format!("Excellent accuracy ({acc}). The current level is easy."),
      ReasonCode::ImprovingGoodAccuracy =>
        format!("Good accuracy ({acc}) and improving. Keeping the level to consolidate gains."),
      ReasonCode::GoodAccuracy =>
        format!("Good accuracy ({acc}). Maintain the current level."),
      ReasonCode::AdequateAccuracy =>
        format!("Adequate accuracy ({acc}) for the current level."),
    }
  }
}

/// Numeric inputs used for a decision. Missing sources leave fields at zero/false.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
  pub total_exercises: usize,
  pub session_accuracy: f64,
  pub historical_accuracy: f64,
  pub session_mean_latency: f64,
  pub historical_mean_latency: f64,
  pub current_correct_streak: usize,
  pub current_incorrect_streak: usize,
  pub max_correct_streak: usize,
  pub max_incorrect_streak: usize,
  pub session_count: usize,
  pub recent_improvement: bool,
}

impl Metrics {
  /// Session accuracy when there is any, historical accuracy otherwise.
  pub fn primary_accuracy(&self) -> f64 {
    if self.session_accuracy > 0.0 { self.session_accuracy } else { self.historical_accuracy }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub current_level: Level,
  pub recommended_level: Level,
  pub direction: Direction,
  pub reason_code: ReasonCode,
  pub reason: String,
  pub confidence: Confidence,
  pub metrics: Metrics,
  pub changed: bool,
}

/// The adaptation engine. Stateless between calls; cheap to clone and share.
#[derive(Clone, Debug, Default)]
pub struct LevelAdapter {
  thresholds: Thresholds,
}

impl LevelAdapter {
  pub fn new(thresholds: Thresholds) -> Self {
    Self { thresholds }
  }

  pub fn recommend_level(
    &self,
    current_level: &str,
    session: Option<&SessionStats>,
    learner: Option<&LearnerStats>,
    attempts: Option<&[Attempt]>,
  ) -> Recommendation {
    let current = Level::parse_or_default(current_level);
    let metrics = extract_metrics(session, learner, attempts);
    let confidence = self.confidence(metrics.total_exercises);
    let (direction, reason_code) = self.decide(&metrics, confidence);
    let recommended = apply_shift(current, direction);
    let reason = reason_code.render(&metrics, metrics.primary_accuracy());

    debug!(
      target: "adaptation",
      requested = %current_level,
      current = %current,
      recommended = %recommended,
      ?direction,
      ?confidence,
      ?reason_code,
      total_exercises = metrics.total_exercises,
      primary_accuracy = metrics.primary_accuracy(),
      "Level recommendation computed"
    );

    Recommendation {
      current_level: current,
      recommended_level: recommended,
      direction,
      reason_code,
      reason,
      confidence,
      metrics,
      changed: recommended != current,
    }
  }

  pub fn confidence(&self, total_exercises: usize) -> Confidence {
    if total_exercises >= self.thresholds.high_confidence_min {
      Confidence::High
    } else if total_exercises >= self.thresholds.medium_confidence_min {
      Confidence::Medium
    } else {
      Confidence::Low
    }
  }

  /// Decision table, evaluated top to bottom.
  fn decide(&self, m: &Metrics, confidence: Confidence) -> (Direction, ReasonCode) {
    let t = &self.thresholds;
    let primary = m.primary_accuracy();
    let fast = m.session_mean_latency > 0.0 && m.session_mean_latency < t.fast_latency_secs;

    if confidence == Confidence::Low {
      if primary < t.lower_accuracy {
        return (Direction::Lower, ReasonCode::LowAccuracySparseData);
      }
      return (Direction::Hold, ReasonCode::InsufficientData);
    }

    // A long bad run dominates a middling accuracy.
    if m.max_incorrect_streak >= t.min_incorrect_streak {
      return (Direction::Lower, ReasonCode::IncorrectStreak);
    }

    if primary < t.lower_accuracy {
      return (Direction::Lower, ReasonCode::LowAccuracy);
    }

    if m.max_correct_streak >= t.min_correct_streak {
      let code = if fast { ReasonCode::FastCorrectStreak } else { ReasonCode::CorrectStreak };
      return (Direction::Raise, code);
    }

    if primary > t.raise_accuracy {
      let code = if fast { ReasonCode::FastHighAccuracy } else { ReasonCode::HighAccuracy };
      return (Direction::Raise, code);
    }

    if primary > t.hold_high_accuracy {
      let code = if m.recent_improvement { ReasonCode::ImprovingGoodAccuracy } else { ReasonCode::GoodAccuracy };
      return (Direction::Hold, code);
    }

    (Direction::Hold, ReasonCode::AdequateAccuracy)
  }
}

pub fn extract_metrics(
  session: Option<&SessionStats>,
  learner: Option<&LearnerStats>,
  attempts: Option<&[Attempt]>,
) -> Metrics {
  let mut m = Metrics::default();

  if let Some(s) = session {
    m.total_exercises = s.completed;
    m.session_accuracy = s.accuracy;
    m.session_mean_latency = s.mean_latency_secs;
  }

  if let Some(l) = learner {
    m.historical_accuracy = l.mean_accuracy;
    m.historical_mean_latency = l.mean_latency_secs;
    m.session_count = l.session_count;
    if let Some(s) = session {
      m.recent_improvement = s.accuracy > l.mean_accuracy;
    }
  }

  if let Some(seq) = attempts {
    let st = streaks(seq);
    m.current_correct_streak = st.current_correct;
    m.current_incorrect_streak = st.current_incorrect;
    m.max_correct_streak = st.max_correct;
    m.max_incorrect_streak = st.max_incorrect;
  }

  m
}

/// Move one step in `direction`, staying put at the ends of the scale.
pub fn apply_shift(level: Level, direction: Direction) -> Level {
  let i = level.index();
  match direction {
    Direction::Hold => level,
    Direction::Raise => LEVELS[(i + 1).min(LEVELS.len() - 1)],
    Direction::Lower => LEVELS[i.saturating_sub(1)],
  }
}
