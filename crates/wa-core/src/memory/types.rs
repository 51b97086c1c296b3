//! Transcript types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finished turn as remembered for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: String,
    pub utterance: String,
    pub answer: String,
    /// Tool invocations the turn consumed
    pub steps: usize,
    pub created_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(
        session_id: impl Into<String>,
        utterance: impl Into<String>,
        answer: impl Into<String>,
        steps: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            utterance: utterance.into(),
            answer: answer.into(),
            steps,
            created_at: Utc::now(),
        }
    }
}
