//! Opt-in conversation memory
//!
//! Finished turns are appended to a SQLite transcript keyed by session id.
//! The dispatcher only reads it when a session id is supplied.

mod store;
mod types;

pub use store::TranscriptStore;
pub use types::TurnRecord;
