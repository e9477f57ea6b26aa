//! Huddle LLM - Generation provider adapters with streaming support

pub mod anthropic;
pub mod provider;
pub mod scripted;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use scripted::{ScriptStep, ScriptedProvider};
pub use types::*;
