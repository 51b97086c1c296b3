//! Dispatcher types
//!
//! - Decision: what the reasoner chose to do next
//! - ScratchEntry: one reason/act/observe cycle in the running transcript
//! - Step / Turn: the recorded outcome of an interaction

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reasoner output, parsed strictly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    FinalAnswer { thought: String, answer: String },
    ToolCall {
        thought: String,
        tool: String,
        input: String,
    },
}

/// A cycle as shown back to the reasoner
///
/// Invalid tool selections appear here so the reasoner can correct itself,
/// but never become a [`Step`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchEntry {
    pub thought: String,
    pub tool: String,
    pub input: String,
    pub observation: String,
}

/// A tool invocation recorded during a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub thought: String,
    pub tool: String,
    pub input: String,
    pub output: String,
}

/// One question-to-answer interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub utterance: String,
    pub answer: String,
    /// Tool invocations against registered tools
    pub steps: Vec<Step>,
    /// Reasoning cycles consumed, including invalid tool selections
    pub cycles: usize,
}

impl Turn {
    pub fn empty(utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            answer: String::new(),
            steps: Vec::new(),
            cycles: 0,
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Dispatcher state, logged at each transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    AwaitingInput,
    Reasoning,
    ToolCall,
    Done,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingInput => "AWAITING_INPUT",
            Self::Reasoning => "REASONING",
            Self::ToolCall => "TOOL_CALL",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}
