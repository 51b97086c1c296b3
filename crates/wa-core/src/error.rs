//! Error types for wa-core

use thiserror::Error;

/// Main error type for wa-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM API error: {0}")]
    Llm(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The data store could not be reached (fatal for the turn)
    #[error("Data source unavailable: {0}")]
    Connection(String),

    /// No runnable query could be derived from the question
    #[error("Query generation failed: {0}")]
    QueryGeneration(String),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// The reasoner named a tool that is not registered
    #[error("Unknown tool: {0}")]
    ToolDispatch(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Could not parse reasoner output: {0}")]
    UnparseableReasonerOutput(String),

    #[error("Step budget of {max_steps} exhausted without a final answer")]
    StepBudgetExceeded { max_steps: usize },

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Code execution was enabled without process isolation
    #[error("Refusing unsandboxed code execution: {0}")]
    UnsandboxedExecution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the dispatcher should feed this error back to the reasoner as an
    /// observation instead of ending the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QueryGeneration(_) | Self::ToolExecution(_) | Self::ToolDispatch(_)
        )
    }

    /// What the user sees instead of an answer when a turn fails this way.
    pub fn apology(&self) -> Option<String> {
        match self {
            Self::StepBudgetExceeded { max_steps } => Some(format!(
                "Sorry, I could not complete that request within {} steps.",
                max_steps
            )),
            Self::Connection(_) => Some("Sorry, the warehouse is unreachable right now.".to_string()),
            _ => None,
        }
    }
}

/// Result type alias for wa-core
pub type Result<T> = std::result::Result<T, Error>;
