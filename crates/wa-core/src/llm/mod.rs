//! Text completion service
//!
//! Supports both Claude API and OpenAI-compatible APIs behind the
//! [`CompletionModel`] trait, so the reasoner and tools can be driven by a
//! scripted model in tests.

mod client;
mod types;

use async_trait::async_trait;

use crate::Result;

pub use client::LlmClient;
pub use types::*;

/// Text-in, text-out completion service
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
