//! Error types for wa-web

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::api::AskResponse;

/// wa-web error type
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Agent(#[from] wa_core::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WebError>;

impl WebError {
    /// Apology shown in place of an answer for turn-level failures
    pub fn apology(&self) -> Option<String> {
        match self {
            WebError::Agent(err) => err.apology(),
            _ => None,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if let Some(output) = self.apology() {
            warn!("Turn failed: {}", self);
            return Json(AskResponse {
                output,
                steps: 0,
                session_id: None,
            })
            .into_response();
        }

        error!("Request failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apology_messages() {
        let err = WebError::from(wa_core::Error::StepBudgetExceeded { max_steps: 3 });
        assert_eq!(
            err.apology().unwrap(),
            "Sorry, I could not complete that request within 3 steps."
        );

        let err = WebError::from(wa_core::Error::Connection("refused".to_string()));
        assert_eq!(
            err.apology().unwrap(),
            "Sorry, the warehouse is unreachable right now."
        );

        let err = WebError::from(wa_core::Error::Other("boom".to_string()));
        assert!(err.apology().is_none());
    }

    #[test]
    fn test_status_codes() {
        let ok = WebError::from(wa_core::Error::Connection("refused".to_string())).into_response();
        assert_eq!(ok.status(), StatusCode::OK);

        let fatal = WebError::ServerError("bind".to_string()).into_response();
        assert_eq!(fatal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
