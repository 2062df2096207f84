use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use poke_agent::{Agent, AgentTool, ToolExecutionResult};
use poke_ai::{
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, PokeAiError,
    ToolDefinition,
};

use super::{
    ChatError, ChatRegistry, ChatRegistryConfig, ChatRole, NoopToolRegistrar, ToolRegistrar,
    ToolRegistrarFn,
};

struct ScriptedClient {
    responses: Mutex<Vec<ChatResponse>>,
}

impl ScriptedClient {
    fn new(responses: Vec<ChatResponse>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        Self {
            responses: Mutex::new(reversed),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, PokeAiError> {
        self.responses
            .lock()
            .expect("responses lock")
            .pop()
            .ok_or_else(|| PokeAiError::InvalidResponse("script exhausted".to_string()))
    }
}

struct FailingClient;

#[async_trait]
impl LlmClient for FailingClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, PokeAiError> {
        Err(PokeAiError::InvalidResponse(
            "model unavailable".to_string(),
        ))
    }
}

struct EchoTool;

#[async_trait]
impl AgentTool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes the provided arguments".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                }
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::ok(arguments)
    }
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_text(text),
        finish_reason: Some("stop".to_string()),
        usage: ChatUsage::default(),
    }
}

fn tool_call_response(id: &str, name: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        message: Message::assistant_blocks(vec![ContentBlock::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }]),
        finish_reason: Some("tool_calls".to_string()),
        usage: ChatUsage::default(),
    }
}

fn registry_with(client: Arc<dyn LlmClient>) -> ChatRegistry {
    ChatRegistry::new(
        client,
        Arc::new(NoopToolRegistrar),
        ChatRegistryConfig::default(),
    )
}

fn echo_registrar() -> Arc<dyn ToolRegistrar> {
    Arc::new(ToolRegistrarFn::new(|agent: &mut Agent| {
        agent.register_tool(EchoTool);
    }))
}

#[tokio::test]
async fn fresh_chat_has_empty_visible_history() {
    let registry = registry_with(Arc::new(ScriptedClient::new(vec![])));
    let chat_id = registry.create_chat(Some("u-1"));

    let history = registry.get_history(&chat_id).await.expect("history");
    assert!(history.is_empty());
    assert_eq!(
        registry.get_owner(&chat_id).await.expect("owner"),
        Some("u-1".to_string())
    );
}

#[tokio::test]
async fn unknown_session_is_an_error_everywhere() {
    let registry = registry_with(Arc::new(ScriptedClient::new(vec![])));

    assert!(matches!(
        registry.get_history("missing").await,
        Err(ChatError::UnknownSession(_))
    ));
    assert!(matches!(
        registry.get_tool_calls("missing").await,
        Err(ChatError::UnknownSession(_))
    ));
    assert!(matches!(
        registry.get_owner("missing").await,
        Err(ChatError::UnknownSession(_))
    ));
    assert!(matches!(
        registry.run_turn("missing", "hi", Some("u-1")).await,
        Err(ChatError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn non_owner_cannot_run_turns() {
    let registry = registry_with(Arc::new(ScriptedClient::new(vec![text_response("hello")])));
    let chat_id = registry.create_chat(Some("owner-a"));

    let denied = registry.run_turn(&chat_id, "hi", Some("owner-b")).await;
    assert!(matches!(denied, Err(ChatError::NotOwner(_))));

    let anonymous = registry.run_turn(&chat_id, "hi", None).await;
    assert!(matches!(anonymous, Err(ChatError::NotOwner(_))));

    let allowed = registry
        .run_turn(&chat_id, "hi", Some("owner-a"))
        .await
        .expect("owner turn");
    assert_eq!(allowed.response, "hello");
}

#[tokio::test]
async fn anonymous_owner_requires_anonymous_requester() {
    let registry = registry_with(Arc::new(ScriptedClient::new(vec![text_response("hello")])));
    let chat_id = registry.create_chat(None);

    let named = registry.run_turn(&chat_id, "hi", Some("u-1")).await;
    assert!(matches!(named, Err(ChatError::NotOwner(_))));

    let anonymous = registry
        .run_turn(&chat_id, "hi", None)
        .await
        .expect("anonymous turn");
    assert_eq!(anonymous.response, "hello");
}

#[tokio::test]
async fn one_turn_appends_exactly_user_and_assistant() {
    let registry = registry_with(Arc::new(ScriptedClient::new(vec![text_response(
        "Pikachu is electric.",
    )])));
    let chat_id = registry.create_chat(Some("u-1"));

    registry
        .run_turn(&chat_id, "tell me about pikachu", Some("u-1"))
        .await
        .expect("turn");

    let history = registry.get_history(&chat_id).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[0].content, "tell me about pikachu");
    assert_eq!(history[1].role, ChatRole::Assistant);
    assert_eq!(history[1].content, "Pikachu is electric.");
}

#[tokio::test]
async fn tool_calls_are_recorded_per_turn_and_cumulatively() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response("call_1", "echo", json!({ "message": "one" })),
        text_response("first done"),
        tool_call_response("call_2", "echo", json!({ "message": "two" })),
        text_response("second done"),
    ]));
    let registry = ChatRegistry::new(client, echo_registrar(), ChatRegistryConfig::default());
    let chat_id = registry.create_chat(Some("u-1"));

    let first = registry
        .run_turn(&chat_id, "echo one", Some("u-1"))
        .await
        .expect("first turn");
    assert_eq!(first.response, "first done");
    assert_eq!(first.tool_calls.len(), 1);
    assert_eq!(first.tool_calls[0].tool_name, "echo");
    assert_eq!(first.tool_calls[0].parameters, json!({ "message": "one" }));
    assert!(first.tool_calls[0].output.contains("one"));

    let second = registry
        .run_turn(&chat_id, "echo two", Some("u-1"))
        .await
        .expect("second turn");
    assert_eq!(second.tool_calls.len(), 1);
    assert_eq!(second.tool_calls[0].parameters, json!({ "message": "two" }));

    let cumulative = registry.get_tool_calls(&chat_id).await.expect("log");
    assert_eq!(cumulative.len(), 2);
}

#[tokio::test]
async fn agent_failure_becomes_an_apologetic_reply() {
    let registry = registry_with(Arc::new(FailingClient));
    let chat_id = registry.create_chat(Some("u-1"));

    let outcome = registry
        .run_turn(&chat_id, "hello", Some("u-1"))
        .await
        .expect("turn must still succeed");

    assert!(outcome.response.contains("I apologize"));
    assert!(outcome.response.contains("model unavailable"));
    assert!(outcome.tool_calls.is_empty());

    let history = registry.get_history(&chat_id).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, outcome.response);
}

#[tokio::test]
async fn empty_final_reply_falls_back_to_tool_summary() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response("call_1", "echo", json!({ "message": "hi" })),
        text_response(""),
    ]));
    let registry = ChatRegistry::new(client, echo_registrar(), ChatRegistryConfig::default());
    let chat_id = registry.create_chat(Some("u-1"));

    let outcome = registry
        .run_turn(&chat_id, "echo hi", Some("u-1"))
        .await
        .expect("turn");

    assert_eq!(outcome.response, "I've used the following tools: echo.");
}
