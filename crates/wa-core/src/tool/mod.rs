//! Tool system for the reasoning loop
//!
//! A tool is a named capability with a description the reasoner reads when
//! choosing, and a single string argument.

pub mod toolset;
pub mod traits;

pub use toolset::Toolset;
pub use traits::Tool;
