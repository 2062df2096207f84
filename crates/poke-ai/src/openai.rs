use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::{
    retry::{is_retryable_http_error, next_backoff_ms, parse_retry_after_ms, should_retry_status},
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    PokeAiError, ToolDefinition,
};

#[derive(Debug, Clone)]
/// Connection settings for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            organization: None,
            request_timeout_ms: 120_000,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone)]
/// OpenAI-compatible chat-completions client with bounded retry.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, PokeAiError> {
        if config.api_key.trim().is_empty() {
            return Err(PokeAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| PokeAiError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );

        if let Some(org) = &config.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| {
                    PokeAiError::InvalidResponse(format!("invalid organization header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, PokeAiError> {
        let body = build_chat_request_body(&request)?;
        let url = self.chat_completions_url();
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let response = self.client.post(&url).json(&body).send().await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let raw = response.text().await?;
                        return parse_chat_response(&raw);
                    }

                    let retry_after_ms = parse_retry_after_ms(response.headers());
                    let raw = response.text().await?;
                    if attempt < max_retries && should_retry_status(status.as_u16()) {
                        let backoff_ms =
                            next_backoff_ms(attempt).max(retry_after_ms.unwrap_or(0));
                        sleep(std::time::Duration::from_millis(backoff_ms)).await;
                        continue;
                    }

                    return Err(PokeAiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    });
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_http_error(&error) {
                        sleep(std::time::Duration::from_millis(next_backoff_ms(attempt))).await;
                        continue;
                    }
                    return Err(PokeAiError::Http(error));
                }
            }
        }

        Err(PokeAiError::InvalidResponse(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Result<Value, PokeAiError> {
    let messages = to_openai_messages(&request.messages)?;
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        body["tools"] = to_openai_tools(&request.tools);
    }

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    Ok(body)
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<Value>, PokeAiError> {
    let mut serialized = Vec::new();

    for message in messages {
        match message.role {
            MessageRole::System => serialized.push(json!({
                "role": "system",
                "content": message.text_content(),
            })),
            MessageRole::User => serialized.push(json!({
                "role": "user",
                "content": message.text_content(),
            })),
            MessageRole::Assistant => {
                let tool_calls: Vec<Value> = message
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();

                let text = message.text_content();
                let content = if text.trim().is_empty() && !tool_calls.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };

                if tool_calls.is_empty() {
                    serialized.push(json!({
                        "role": "assistant",
                        "content": content,
                    }));
                } else {
                    serialized.push(json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tool_calls,
                    }));
                }
            }
            MessageRole::Tool => {
                let Some(tool_call_id) = message.tool_call_id.as_deref() else {
                    return Err(PokeAiError::InvalidResponse(
                        "tool message is missing tool_call_id".to_string(),
                    ));
                };

                let mut tool_message = json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": message.text_content(),
                });

                if let Some(name) = &message.tool_name {
                    tool_message["name"] = Value::String(name.clone());
                }

                serialized.push(tool_message);
            }
        }
    }

    Ok(serialized)
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, PokeAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice =
        parsed.choices.into_iter().next().ok_or_else(|| {
            PokeAiError::InvalidResponse("response contained no choices".to_string())
        })?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content {
        if !text.trim().is_empty() {
            content.push(ContentBlock::Text { text });
        }
    }

    if let Some(tool_calls) = choice.message.tool_calls {
        for tool_call in tool_calls {
            if tool_call.call_type != "function" {
                continue;
            }

            let arguments = match serde_json::from_str::<Value>(&tool_call.function.arguments) {
                Ok(value) => value,
                Err(_) => Value::String(tool_call.function.arguments),
            };

            content.push(ContentBlock::ToolCall {
                id: tool_call.id,
                name: tool_call.function.name,
                arguments,
            });
        }
    }

    let message = Message {
        role: MessageRole::Assistant,
        content,
        tool_call_id: None,
        tool_name: None,
        is_error: false,
    };

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message,
        finish_reason: choice.finish_reason,
        usage,
    })
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{build_chat_request_body, parse_chat_response, OpenAiClient, OpenAiConfig};
    use crate::{ChatRequest, ContentBlock, LlmClient, Message, PokeAiError, ToolDefinition};

    fn sample_tools() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "get_pokemon_details".to_string(),
            description: "Fetch details for one Pokémon by id".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer" }
                },
                "required": ["id"]
            }),
        }]
    }

    #[test]
    fn serializes_assistant_tool_calls() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                Message::system("You are PokéGPT"),
                Message::user("tell me about pikachu"),
                Message::assistant_blocks(vec![ContentBlock::ToolCall {
                    id: "call_1".to_string(),
                    name: "get_pokemon_details".to_string(),
                    arguments: json!({ "id": 25 }),
                }]),
                Message::tool_result("call_1", "get_pokemon_details", "{\"id\":25}", false),
            ],
            tools: sample_tools(),
            max_tokens: Some(512),
            temperature: Some(0.0),
        };

        let body = build_chat_request_body(&request).expect("request body must serialize");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["name"],
            "get_pokemon_details"
        );
        assert_eq!(body["messages"][2]["content"], json!(null));
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["tools"][0]["function"]["name"], "get_pokemon_details");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn tool_message_without_call_id_is_rejected() {
        let mut orphan = Message::tool_result("call_1", "get_pokemon_list", "[]", false);
        orphan.tool_call_id = None;
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![orphan],
            tools: vec![],
            max_tokens: None,
            temperature: None,
        };

        let error = build_chat_request_body(&request).expect_err("must fail");
        assert!(error.to_string().contains("tool_call_id"));
    }

    #[test]
    fn parses_tool_calls_from_response() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "get_pokemon_list",
                            "arguments": "{}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 4,
                "total_tokens": 14
            }
        }"#;

        let response = parse_chat_response(raw).expect("response must parse");
        assert_eq!(response.message.tool_calls().len(), 1);
        assert_eq!(response.usage.total_tokens, 14);
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn missing_api_key_is_rejected_at_construction() {
        let error = OpenAiClient::new(OpenAiConfig::default()).expect_err("must fail");
        assert!(matches!(error, PokeAiError::MissingApiKey));
    }

    #[tokio::test]
    async fn complete_retries_retryable_statuses() {
        let server = MockServer::start_async().await;
        let failure = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let client = OpenAiClient::new(OpenAiConfig {
            api_base: server.base_url(),
            api_key: "test-key".to_string(),
            max_retries: 1,
            ..OpenAiConfig::default()
        })
        .expect("client");

        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("hello")],
            tools: vec![],
            max_tokens: None,
            temperature: None,
        };

        let error = client.complete(request).await.expect_err("must exhaust retries");
        assert!(matches!(error, PokeAiError::HttpStatus { status: 503, .. }));
        failure.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn complete_returns_assistant_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{
                        "message": { "content": "**Pikachu** is an Electric-type." },
                        "finish_reason": "stop"
                    }],
                    "usage": { "prompt_tokens": 9, "completion_tokens": 8, "total_tokens": 17 }
                }));
            })
            .await;

        let client = OpenAiClient::new(OpenAiConfig {
            api_base: server.base_url(),
            api_key: "test-key".to_string(),
            ..OpenAiConfig::default()
        })
        .expect("client");

        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("tell me about pikachu")],
            tools: sample_tools(),
            max_tokens: None,
            temperature: None,
        };

        let response = client.complete(request).await.expect("completion");
        assert_eq!(
            response.message.text_content(),
            "**Pikachu** is an Electric-type."
        );
        assert_eq!(response.usage.input_tokens, 9);
    }
}
