//! LLM provider integrations for expert-panel
//!
//! Defines the [`LLMProvider`] seam the consultation engine talks through and
//! an OpenAI-compatible HTTP implementation of it.

pub mod base;
pub mod openai;

pub use base::{
    ChatRequest, Endpoint, InvocationErrorKind, LLMProvider, LLMResponse, Message, ProviderError,
    ProviderResult, ToolCallRequest,
};
pub use openai::OpenAICompatClient;
