//! Chat-completion types and the OpenAI-compatible client used by the agent loop.

mod openai;
mod retry;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use retry::{
    is_retryable_http_error, next_backoff_ms, parse_retry_after_ms, should_retry_status,
};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    PokeAiError, ToolCall, ToolDefinition,
};
