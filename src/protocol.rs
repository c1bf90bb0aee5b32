//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::{Confidence, Direction, Metrics, ReasonCode, Recommendation};
use crate::domain::{Attempt, Level, Session};
use crate::stats::{LearnerStats, SessionStats};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    RecordAttempt {
        session_id: String,
        exercise_id: String,
        option: String,
        correct: bool,
        latency_secs: u32,
    },
    CompleteSession {
        session_id: String,
    },
    Recommend {
        learner_id: String,
        #[serde(default)]
        track: Option<String>,
        #[serde(default)]
        current_level: Option<String>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    AttemptRecorded {
        attempt: Attempt,
        progress: ProgressOut,
    },
    SessionCompleted {
        stats: SessionStats,
        recommendation: RecommendationOut,
    },
    Recommendation {
        based_on_session: Option<String>,
        recommendation: RecommendationOut,
    },
    Error {
        message: String,
    },
}

/// Recommendation as the exercise frontend expects it.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationOut {
    pub nivel_actual: Level,
    pub nivel_recomendado: Level,
    pub direccion: Direction,
    pub razon: String,
    pub codigo_razon: ReasonCode,
    pub confianza: Confidence,
    pub cambio_aplicado: bool,
    pub metricas: Metrics,
}

impl From<Recommendation> for RecommendationOut {
    fn from(r: Recommendation) -> Self {
        Self {
            nivel_actual: r.current_level,
            nivel_recomendado: r.recommended_level,
            direccion: r.direction,
            razon: r.reason,
            codigo_razon: r.reason_code,
            confianza: r.confidence,
            cambio_aplicado: r.changed,
            metricas: r.metrics,
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct CreateSessionIn {
    pub learner_id: String,
    pub track: String,
    pub level: String,
    pub exercise_ids: Vec<String>,
    #[serde(default)]
    pub profile: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub success: bool,
    pub session: Session,
    pub stats: SessionStats,
}

#[derive(Debug, Deserialize)]
pub struct AttemptIn {
    pub exercise_id: String,
    pub option: String,
    pub correct: bool,
    pub latency_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressOut {
    pub answered: usize,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Serialize)]
pub struct AttemptOut {
    pub success: bool,
    pub attempt: Attempt,
    pub progress: ProgressOut,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteIn {
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CompleteOut {
    pub success: bool,
    pub session_id: String,
    pub stats: SessionStats,
    pub recommendation: RecommendationOut,
}

#[derive(Debug, Deserialize)]
pub struct LearnerSessionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LearnerSessionsOut {
    pub success: bool,
    pub learner_id: String,
    pub total: usize,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Serialize)]
pub struct LearnerStatsOut {
    pub success: bool,
    pub stats: LearnerStats,
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub track: Option<String>,
    pub current_level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendOut {
    pub success: bool,
    pub learner_id: String,
    pub based_on_session: Option<String>,
    pub recommendation: RecommendationOut,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LevelOut {
    pub name: String,
    pub valid: bool,
    pub next_up: Option<Level>,
    pub next_down: Option<Level>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}
