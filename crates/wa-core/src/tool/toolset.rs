//! Ordered, name-unique collection of tools

use std::sync::Arc;

use tracing::debug;

use crate::tool::Tool;
use crate::{Error, Result};

/// Registered tools in registration order
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct Toolset {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolset {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool
    ///
    /// # Errors
    /// `DuplicateTool` if a tool with the same name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.contains(tool.name()) {
            return Err(Error::DuplicateTool(tool.name().to_string()));
        }
        debug!("Registered tool: {}", tool.name());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Invoke a tool by name
    ///
    /// # Errors
    /// `ToolDispatch` if no tool has that name, otherwise whatever the tool returns.
    pub async fn invoke(&self, name: &str, input: &str) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::ToolDispatch(name.to_string()))?;
        tool.invoke(input).await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// `name: description` lines, as listed to the reasoner
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
