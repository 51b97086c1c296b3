//! Tool trait definition

use async_trait::async_trait;

use crate::Result;

/// Tool trait for the agent dispatcher
///
/// Implement this trait to expose a capability to the reasoner. The
/// description is what the reasoner sees when picking between tools, so it
/// must be precise enough to disambiguate siblings.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a toolset (the reasoner's `Action:` value)
    fn name(&self) -> &str;

    /// When to use the tool and what its input should look like
    fn description(&self) -> &str;

    /// Run the tool on a single text input
    ///
    /// # Errors
    /// Recoverable failures (`ToolExecution`, `QueryGeneration`) are turned
    /// into observations by the dispatcher; anything else ends the turn.
    async fn invoke(&self, input: &str) -> Result<String>;
}
