//! wa-core: warehouse agent core library
//!
//! Completion client, tool system, agent dispatcher, warehouse data
//! source and conversation memory.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod tool;
pub mod warehouse;

pub use agent::{Decision, Dispatcher, DispatcherConfig, ReActReasoner, Reasoner, Turn};
pub use config::{
    AgentConfig, CodeExecutionConfig, Config, LlmConfig, LlmProvider, MemoryConfig, QueryConfig,
    ServerConfig, WarehouseConfig,
};
pub use error::{Error, Result};
pub use llm::{CompletionModel, CompletionRequest, LlmClient};
pub use memory::{TranscriptStore, TurnRecord};
pub use tool::{Tool, Toolset};
pub use warehouse::{DataSource, QueryResult, SqliteDataSource};
