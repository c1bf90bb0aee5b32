//! Session service errors.

use thiserror::Error;

use crate::domain::{UnknownLevel, UnknownTrack};

/// Errors that can occur in session store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
  #[error("Session '{0}' not found")]
  NotFound(String),

  #[error("Session '{0}' is already completed")]
  AlreadyCompleted(String),

  #[error("Exercise '{exercise_id}' was already answered in session '{session_id}'")]
  AlreadyAnswered { session_id: String, exercise_id: String },

  #[error("Invalid request: {0}")]
  Invalid(String),
}

impl From<UnknownLevel> for SessionError {
  fn from(e: UnknownLevel) -> Self {
    SessionError::Invalid(e.to_string())
  }
}

impl From<UnknownTrack> for SessionError {
  fn from(e: UnknownTrack) -> Self {
    SessionError::Invalid(e.to_string())
  }
}

impl SessionError {
  /// Stable machine-readable code for API clients.
  pub fn code(&self) -> &'static str {
    match self {
      SessionError::NotFound(_) => "SESSION_NOT_FOUND",
      SessionError::AlreadyCompleted(_) => "SESSION_COMPLETED",
      SessionError::AlreadyAnswered { .. } => "EXERCISE_ALREADY_ANSWERED",
      SessionError::Invalid(_) => "INVALID_REQUEST",
    }
  }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
