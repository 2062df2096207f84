//! Core runtime primitives for building tool-using LLM agents.
use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

use poke_ai::{ChatRequest, LlmClient, Message, PokeAiError, ToolCall, ToolDefinition};

/// Runtime settings for one [`Agent`].
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub system_prompt: String,
    pub max_turns: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_max_retries: usize,
    pub request_retry_initial_backoff_ms: u64,
    pub request_retry_max_backoff_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: String::new(),
            max_turns: 8,
            temperature: Some(0.0),
            max_tokens: None,
            request_max_retries: 2,
            request_retry_initial_backoff_ms: 200,
            request_retry_max_backoff_ms: 2_000,
        }
    }
}

/// Outcome of a single tool execution, inserted back into the conversation.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub content: Value,
    pub is_error: bool,
}

impl ToolExecutionResult {
    /// Creates a successful tool result.
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Creates a failed tool result.
    pub fn error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Converts the payload to text for insertion into a tool message.
    pub fn as_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// Trait contract for `AgentTool` behavior.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use poke_agent::{AgentTool, ToolExecutionResult};
/// use poke_ai::ToolDefinition;
///
/// struct EchoTool;
///
/// #[async_trait]
/// impl AgentTool for EchoTool {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition {
///             name: "echo".to_string(),
///             description: "Echoes a message".to_string(),
///             parameters: json!({
///                 "type": "object",
///                 "properties": {
///                     "message": { "type": "string" }
///                 }
///             }),
///         }
///     }
///
///     async fn execute(&self, arguments: Value) -> ToolExecutionResult {
///         ToolExecutionResult::ok(arguments)
///     }
/// }
///
/// let definition = EchoTool.definition();
/// assert_eq!(definition.name, "echo");
/// ```
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;
}

/// Enumerates supported `AgentError` values.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Ai(#[from] PokeAiError),
    #[error("agent exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),
}

struct RegisteredTool {
    definition: ToolDefinition,
    tool: Arc<dyn AgentTool>,
}

/// A tool-calling agent over one conversation.
///
/// Drives the model until it produces a reply with no tool calls, executing
/// each requested tool in between and feeding the observations back as
/// tool-role messages.
pub struct Agent {
    client: Arc<dyn LlmClient>,
    config: AgentConfig,
    messages: Vec<Message>,
    tools: HashMap<String, RegisteredTool>,
}

impl Agent {
    /// Creates a new [`Agent`] with an initial system message when configured.
    pub fn new(client: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        let mut messages = Vec::new();
        if !config.system_prompt.trim().is_empty() {
            messages.push(Message::system(config.system_prompt.clone()));
        }

        Self {
            client,
            config,
            messages,
            tools: HashMap::new(),
        }
    }

    /// Registers a tool exposed to the language model.
    pub fn register_tool<T>(&mut self, tool: T)
    where
        T: AgentTool + 'static,
    {
        let definition = tool.definition();
        let name = definition.name.clone();
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                tool: Arc::new(tool),
            },
        );
    }

    /// Returns true when a tool with `tool_name` is registered.
    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.contains_key(tool_name)
    }

    /// Returns sorted registered tool names.
    pub fn registered_tool_names(&self) -> Vec<String> {
        let mut names = self.tools.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Appends pre-existing conversation messages, e.g. a restored session.
    pub fn extend_history(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Full conversation, seed messages included.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Runs one user prompt to completion and returns the messages added by
    /// this call (the user message, assistant messages, and tool results).
    pub async fn prompt(&mut self, text: impl Into<String>) -> Result<Vec<Message>, AgentError> {
        let start_index = self.messages.len();
        self.messages.push(Message::user(text));

        for _turn in 0..self.config.max_turns {
            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: self.messages.clone(),
                tools: self.tool_definitions(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let response = self.complete_with_retry(request).await?;
            let assistant = response.message;
            self.messages.push(assistant.clone());

            let tool_calls = assistant.tool_calls();
            if tool_calls.is_empty() {
                return Ok(self.messages[start_index..].to_vec());
            }

            for call in tool_calls {
                let result = self.execute_tool_call(&call).await;
                self.messages.push(Message::tool_result(
                    call.id,
                    call.name,
                    result.as_text(),
                    result.is_error,
                ));
            }
        }

        Err(AgentError::MaxTurnsExceeded(self.config.max_turns))
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self
            .tools
            .values()
            .map(|registered| registered.definition.clone())
            .collect::<Vec<_>>();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> ToolExecutionResult {
        let Some(registered) = self.tools.get(&call.name) else {
            return ToolExecutionResult::error(json!({
                "error": format!("unknown tool '{}'", call.name),
            }));
        };
        registered.tool.execute(call.arguments.clone()).await
    }

    async fn complete_with_retry(
        &self,
        request: ChatRequest,
    ) -> Result<poke_ai::ChatResponse, AgentError> {
        let max_retries = self.config.request_max_retries;
        let mut attempt = 0usize;
        let mut backoff_ms = self.config.request_retry_initial_backoff_ms.max(1);
        let max_backoff_ms = self.config.request_retry_max_backoff_ms.max(backoff_ms);

        loop {
            match self.client.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if attempt >= max_retries || !is_retryable_ai_error(&error) {
                        return Err(AgentError::Ai(error));
                    }
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(max_backoff_ms);
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

fn is_retryable_ai_error(error: &PokeAiError) -> bool {
    match error {
        PokeAiError::Http(http) => http.is_timeout() || http.is_connect(),
        PokeAiError::HttpStatus { status, .. } => {
            *status == 408 || *status == 409 || *status == 425 || *status == 429 || *status >= 500
        }
        PokeAiError::MissingApiKey | PokeAiError::Serde(_) | PokeAiError::InvalidResponse(_) => {
            false
        }
    }
}
