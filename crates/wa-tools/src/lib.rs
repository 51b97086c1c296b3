//! wa-tools: Built-in tools for warehouse-agent
//!
//! The warehouse query tool, the calculator and the sandboxed Python tool.

use std::sync::Arc;

use tracing::info;
use wa_core::{CodeExecutionConfig, CompletionModel, Result, Toolset};

pub mod calculator;
pub mod code_exec;
pub mod expr;
pub mod query;
#[cfg(target_os = "linux")]
mod sandbox;

pub use calculator::CalculatorTool;
pub use code_exec::CodeExecutionTool;
pub use query::{QueryExecutor, QueryTool};

/// Register the built-in tools with the toolset.
///
/// The Python tool is only registered when `code_execution.enabled` is set.
///
/// # Errors
/// `DuplicateTool` if the toolset already holds a tool with one of the
/// built-in names, `UnsandboxedExecution` for an unsafe code execution config.
pub fn register_default_tools(
    toolset: &mut Toolset,
    executor: Arc<QueryExecutor>,
    model: Arc<dyn CompletionModel>,
    code_execution: &CodeExecutionConfig,
) -> Result<()> {
    toolset.register(Arc::new(QueryTool::new(executor)))?;
    toolset.register(Arc::new(CalculatorTool::new(model)))?;

    if code_execution.enabled {
        toolset.register(Arc::new(CodeExecutionTool::new(code_execution.clone())?))?;
    }

    info!("Registered tools: {}", toolset.names().join(", "));
    Ok(())
}
