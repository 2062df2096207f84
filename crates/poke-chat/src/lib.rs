//! Chat session registry: per-session conversation history, fixed ownership,
//! and an append-only tool-call log.
//!
//! Sessions live for the process lifetime. Each turn drives a fresh agent
//! seeded with the session history. Agent failures never fail the turn; they
//! become an apologetic assistant reply instead.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use poke_agent::{Agent, AgentConfig};
use poke_ai::{LlmClient, Message, MessageRole};

pub mod instructions;
#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ChatRole` values.
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One entry of a session's conversation history.
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One recorded tool invocation: name, arguments, and the observation text.
pub struct ToolCallRecord {
    pub tool_name: String,
    pub parameters: Value,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// The assistant reply for one turn plus the tool calls made during it.
pub struct TurnOutcome {
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Error, PartialEq, Eq)]
/// Enumerates supported `ChatError` values.
pub enum ChatError {
    #[error("chat session {0} does not exist")]
    UnknownSession(String),
    #[error("requesting user is not the owner of chat {0}")]
    NotOwner(String),
}

/// Trait contract for `ToolRegistrar` behavior: installs the tool set on a
/// freshly built per-turn agent.
pub trait ToolRegistrar: Send + Sync {
    fn register(&self, agent: &mut Agent);
}

#[derive(Clone, Default)]
/// Registrar that installs no tools.
pub struct NoopToolRegistrar;

impl ToolRegistrar for NoopToolRegistrar {
    fn register(&self, _agent: &mut Agent) {}
}

#[derive(Clone)]
/// Registrar backed by a closure.
pub struct ToolRegistrarFn {
    inner: Arc<dyn Fn(&mut Agent) + Send + Sync>,
}

impl ToolRegistrarFn {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut Agent) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(handler),
        }
    }
}

impl ToolRegistrar for ToolRegistrarFn {
    fn register(&self, agent: &mut Agent) {
        (self.inner)(agent);
    }
}

#[derive(Debug, Clone)]
/// Model settings applied to every per-turn agent.
pub struct ChatRegistryConfig {
    pub model: String,
    pub max_turns: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ChatRegistryConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_turns: 8,
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

struct ChatSession {
    owner_id: Option<String>,
    history: Vec<ChatMessage>,
    tool_calls: Vec<ToolCallRecord>,
}

/// Registry of chat sessions keyed by opaque session id.
///
/// The registry map sits behind a synchronous mutex; each session carries its
/// own async mutex held across the turn, so concurrent turns on the same chat
/// serialize instead of racing.
pub struct ChatRegistry {
    client: Arc<dyn LlmClient>,
    registrar: Arc<dyn ToolRegistrar>,
    config: ChatRegistryConfig,
    sessions: Mutex<HashMap<String, Arc<AsyncMutex<ChatSession>>>>,
}

impl ChatRegistry {
    pub fn new(
        client: Arc<dyn LlmClient>,
        registrar: Arc<dyn ToolRegistrar>,
        config: ChatRegistryConfig,
    ) -> Self {
        Self {
            client,
            registrar,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a session owned by `owner_id` and returns its fresh id. The
    /// history is seeded with one system message rendered from the
    /// instruction template.
    pub fn create_chat(&self, owner_id: Option<&str>) -> String {
        let chat_id = Uuid::new_v4().to_string();
        let seed = ChatMessage {
            role: ChatRole::System,
            content: instructions::system_prompt(owner_id),
        };
        let session = ChatSession {
            owner_id: owner_id.map(str::to_string),
            history: vec![seed],
            tool_calls: Vec::new(),
        };

        self.lock_sessions()
            .insert(chat_id.clone(), Arc::new(AsyncMutex::new(session)));
        tracing::info!(%chat_id, owner = owner_id.unwrap_or("unknown"), "created chat session");
        chat_id
    }

    /// Runs one conversational turn.
    ///
    /// Fails only for unknown sessions and ownership violations. Agent
    /// failures are swallowed: the turn completes with an apologetic
    /// assistant reply that is appended to history like any other response.
    pub async fn run_turn(
        &self,
        chat_id: &str,
        query: &str,
        requesting_user_id: Option<&str>,
    ) -> Result<TurnOutcome, ChatError> {
        let session = self.session(chat_id)?;
        let mut session = session.lock().await;

        if session.owner_id.as_deref() != requesting_user_id {
            return Err(ChatError::NotOwner(chat_id.to_string()));
        }

        let mut agent = Agent::new(
            self.client.clone(),
            AgentConfig {
                model: self.config.model.clone(),
                system_prompt: String::new(),
                max_turns: self.config.max_turns,
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                ..AgentConfig::default()
            },
        );
        agent.extend_history(session.history.iter().map(to_agent_message));
        self.registrar.register(&mut agent);

        let seeded_len = agent.messages().len();
        let (response, tool_calls) = match agent.prompt(query).await {
            Ok(new_messages) => {
                let records = collect_tool_call_records(&new_messages);
                (final_response_text(&new_messages, &records), records)
            }
            Err(error) => {
                tracing::warn!(%chat_id, %error, "agent turn failed, synthesizing reply");
                // Tool calls completed before the failure are still on the
                // agent's transcript.
                let records = collect_tool_call_records(&agent.messages()[seeded_len..]);
                (
                    format!(
                        "I apologize, but I encountered an error processing your request. \
                         Error details: {error}"
                    ),
                    records,
                )
            }
        };

        session.history.push(ChatMessage {
            role: ChatRole::User,
            content: query.to_string(),
        });
        session.history.push(ChatMessage {
            role: ChatRole::Assistant,
            content: response.clone(),
        });
        session.tool_calls.extend(tool_calls.iter().cloned());

        Ok(TurnOutcome {
            response,
            tool_calls,
        })
    }

    /// The session's conversation with every system-role message stripped.
    pub async fn get_history(&self, chat_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let session = self.session(chat_id)?;
        let session = session.lock().await;
        Ok(session
            .history
            .iter()
            .filter(|message| message.role != ChatRole::System)
            .cloned()
            .collect())
    }

    /// The session's cumulative tool-call log.
    pub async fn get_tool_calls(&self, chat_id: &str) -> Result<Vec<ToolCallRecord>, ChatError> {
        let session = self.session(chat_id)?;
        let session = session.lock().await;
        Ok(session.tool_calls.clone())
    }

    pub async fn get_owner(&self, chat_id: &str) -> Result<Option<String>, ChatError> {
        let session = self.session(chat_id)?;
        let session = session.lock().await;
        Ok(session.owner_id.clone())
    }

    fn session(&self, chat_id: &str) -> Result<Arc<AsyncMutex<ChatSession>>, ChatError> {
        self.lock_sessions()
            .get(chat_id)
            .cloned()
            .ok_or_else(|| ChatError::UnknownSession(chat_id.to_string()))
    }

    fn lock_sessions(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<ChatSession>>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_agent_message(message: &ChatMessage) -> Message {
    match message.role {
        ChatRole::System => Message::system(message.content.clone()),
        ChatRole::User => Message::user(message.content.clone()),
        ChatRole::Assistant => Message::assistant_text(message.content.clone()),
    }
}

/// Pairs each assistant tool-call block with the tool-result message carrying
/// the same call id.
fn collect_tool_call_records(messages: &[Message]) -> Vec<ToolCallRecord> {
    let mut records = Vec::new();
    for message in messages {
        if message.role != MessageRole::Assistant {
            continue;
        }
        for call in message.tool_calls() {
            let output = messages
                .iter()
                .find(|candidate| {
                    candidate.role == MessageRole::Tool
                        && candidate.tool_call_id.as_deref() == Some(call.id.as_str())
                })
                .map(|result| result.text_content())
                .unwrap_or_else(|| "No output captured.".to_string());
            records.push(ToolCallRecord {
                tool_name: call.name,
                parameters: call.arguments,
                output,
            });
        }
    }
    records
}

fn final_response_text(messages: &[Message], records: &[ToolCallRecord]) -> String {
    let reply = messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::Assistant)
        .map(|message| message.text_content())
        .unwrap_or_default();
    if !reply.trim().is_empty() {
        return reply;
    }

    if !records.is_empty() {
        let names = records
            .iter()
            .map(|record| record.tool_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return format!("I've used the following tools: {names}.");
    }

    reply
}
