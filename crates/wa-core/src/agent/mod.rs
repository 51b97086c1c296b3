//! Agent dispatcher
//!
//! A [`Reasoner`] picks the next tool (or finishes); the [`Dispatcher`]
//! invokes it, feeds the observation back and enforces the step budget.

mod dispatcher;
mod parser;
mod reasoner;
mod types;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use parser::parse_decision;
pub use reasoner::{OBSERVATION_STOP, ReActReasoner, Reasoner, ReasoningContext};
pub use types::{Decision, DispatchState, ScratchEntry, Step, Turn};
