//! Domain models: difficulty levels, subject tracks, attempts and sessions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Difficulty tier. Ordered from easiest to hardest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
  #[serde(rename = "basico", alias = "basic")]
  Basic,
  #[default]
  #[serde(rename = "intermedio", alias = "intermediate")]
  Intermediate,
  #[serde(rename = "avanzado", alias = "advanced")]
  Advanced,
}

/// The scale, indexed by position. Shifts are index +/- 1 clamped to bounds.
pub const LEVELS: [Level; 3] = [Level::Basic, Level::Intermediate, Level::Advanced];

impl Level {
  pub fn as_str(self) -> &'static str {
    match self {
      Level::Basic => "basico",
      Level::Intermediate => "intermedio",
      Level::Advanced => "avanzado",
    }
  }

  pub fn index(self) -> usize {
    match self {
      Level::Basic => 0,
      Level::Intermediate => 1,
      Level::Advanced => 2,
    }
  }

  /// One step harder, or `None` at the ceiling.
  pub fn up(self) -> Option<Level> {
    LEVELS.get(self.index() + 1).copied()
  }

  /// One step easier, or `None` at the floor.
  pub fn down(self) -> Option<Level> {
    self.index().checked_sub(1).and_then(|i| LEVELS.get(i).copied())
  }

  /// Tolerant parse: unknown names fall back to Intermediate.
  pub fn parse_or_default(name: &str) -> Level {
    name.parse().unwrap_or_default()
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown level '{0}' (expected basico, intermedio or avanzado)")]
pub struct UnknownLevel(pub String);

impl FromStr for Level {
  type Err = UnknownLevel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "basico" | "basic" => Ok(Level::Basic),
      "intermedio" | "intermediate" => Ok(Level::Intermediate),
      "avanzado" | "advanced" => Ok(Level::Advanced),
      _ => Err(UnknownLevel(s.to_string())),
    }
  }
}

/// Next level up from a level name. `None` at the ceiling or for unknown names.
pub fn next_level_up(name: &str) -> Option<Level> {
  name.parse::<Level>().ok().and_then(Level::up)
}

/// Next level down from a level name. `None` at the floor or for unknown names.
pub fn next_level_down(name: &str) -> Option<Level> {
  name.parse::<Level>().ok().and_then(Level::down)
}

pub fn is_valid_level(name: &str) -> bool {
  name.parse::<Level>().is_ok()
}

/// Subject area a session belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Track {
  #[serde(rename = "matematicas")]
  Mathematics,
  #[serde(rename = "verbal")]
  Verbal,
}

impl Track {
  pub fn as_str(self) -> &'static str {
    match self {
      Track::Mathematics => "matematicas",
      Track::Verbal => "verbal",
    }
  }
}

impl fmt::Display for Track {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown track '{0}' (expected matematicas or verbal)")]
pub struct UnknownTrack(pub String);

impl FromStr for Track {
  type Err = UnknownTrack;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "matematicas" | "mathematics" | "math" => Ok(Track::Mathematics),
      "verbal" => Ok(Track::Verbal),
      _ => Err(UnknownTrack(s.to_string())),
    }
  }
}

/// One answered exercise. Never mutated after it is recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attempt {
  pub exercise_id: String,
  pub option: String,
  pub correct: bool,
  pub latency_secs: u32,
  pub answered_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  Started,
  InProgress,
  Completed,
}

/// A run of exercises for one learner on one track, persisted in-memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
  pub id: String,
  pub learner_id: String,
  pub track: Track,
  pub level: Level,
  pub exercise_ids: Vec<String>,
  #[serde(default)] pub attempts: Vec<Attempt>,
  pub started_at: DateTime<Utc>,
  #[serde(default)] pub ended_at: Option<DateTime<Utc>>,
  pub status: SessionStatus,
  /// Snapshot of the learner profile used to generate the exercises. Opaque here.
  #[serde(default)] pub profile: serde_json::Value,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn levels_step_one_at_a_time_and_clamp() {
    assert_eq!(Level::Basic.up(), Some(Level::Intermediate));
    assert_eq!(Level::Intermediate.up(), Some(Level::Advanced));
    assert_eq!(Level::Advanced.up(), None);
    assert_eq!(Level::Advanced.down(), Some(Level::Intermediate));
    assert_eq!(Level::Basic.down(), None);
  }

  #[test]
  fn named_helpers_reject_unknown_names() {
    assert_eq!(next_level_up("basico"), Some(Level::Intermediate));
    assert_eq!(next_level_up("avanzado"), None);
    assert_eq!(next_level_down("intermedio"), Some(Level::Basic));
    assert_eq!(next_level_down("basico"), None);
    assert_eq!(next_level_up("xyz"), None);
    assert_eq!(next_level_down("xyz"), None);
    assert!(is_valid_level("Avanzado"));
    assert!(is_valid_level(" intermediate "));
    assert!(!is_valid_level("expert"));
  }

  #[test]
  fn unknown_level_defaults_to_intermediate() {
    assert_eq!(Level::parse_or_default("xyz"), Level::Intermediate);
    assert_eq!(Level::parse_or_default("basico"), Level::Basic);
    assert_eq!(Level::default(), Level::Intermediate);
  }

  #[test]
  fn parse_errors_carry_the_rejected_name() {
    let err = "experto".parse::<Level>().unwrap_err();
    assert_eq!(err, UnknownLevel("experto".into()));
    assert!(err.to_string().contains("'experto'"));

    let err = " Historia ".parse::<Track>().unwrap_err();
    assert_eq!(err, UnknownTrack(" Historia ".into()));
    assert!(err.to_string().contains("matematicas or verbal"));
    assert_eq!("Math".parse::<Track>(), Ok(Track::Mathematics));

    // Both plug into `?` as std errors.
    let boxed: Box<dyn std::error::Error> = Box::new(err);
    assert!(boxed.to_string().starts_with("unknown track"));
  }

  #[test]
  fn level_serializes_with_canonical_names() {
    let json = serde_json::to_string(&Level::Advanced).unwrap();
    assert_eq!(json, "\"avanzado\"");
    let parsed: Level = serde_json::from_str("\"basic\"").unwrap();
    assert_eq!(parsed, Level::Basic);
  }
}
