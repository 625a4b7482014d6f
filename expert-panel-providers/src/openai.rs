//! OpenAI-compatible chat-completions HTTP client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::base::{
    normalize_arguments, ChatRequest, Endpoint, LLMProvider, LLMResponse, ProviderError,
    ProviderResult, ToolCallRequest,
};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default)]
    call_type: Option<String>,
    function: Function,
}

#[derive(Debug, Deserialize)]
struct Function {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

/// Speaks the `/chat/completions` wire format to any compatible endpoint.
///
/// The endpoint is chosen per request, so one client (and its connection
/// pool) serves both the coordinator and the experts.
#[derive(Debug, Clone)]
pub struct OpenAICompatClient {
    client: Client,
    default_timeout: Duration,
}

impl OpenAICompatClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(120))
    }

    /// Timeout applied when an endpoint does not carry its own
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .http1_only()
                .build()
                .unwrap_or_else(|_| Client::new()),
            default_timeout,
        }
    }

    fn parse_response(&self, response: ChatCompletionResponse) -> ProviderResult<LLMResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse("No choices in response".to_string()))?;

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| {
                let arguments = normalize_arguments(tc.function.arguments);
                if arguments.contains_key("raw") {
                    warn!("Failed to parse arguments of tool call {}", tc.function.name);
                }
                ToolCallRequest {
                    id: tc.id,
                    call_type: tc.call_type.unwrap_or_else(|| "function".to_string()),
                    name: tc.function.name,
                    arguments,
                }
            })
            .collect();

        let content = choice.message.content;
        let blank = content.as_deref().map_or(true, |c| c.trim().is_empty());
        if blank && tool_calls.is_empty() {
            return Err(ProviderError::EmptyResponse(
                "Response has neither content nor tool calls".to_string(),
            ));
        }

        let mut usage = HashMap::new();
        if let Some(u) = response.usage {
            usage.insert("prompt_tokens".to_string(), u.prompt_tokens);
            usage.insert("completion_tokens".to_string(), u.completion_tokens);
            usage.insert("total_tokens".to_string(), u.total_tokens);
        }

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }

    fn apply_headers(
        &self,
        mut req_builder: reqwest::RequestBuilder,
        endpoint: &Endpoint,
    ) -> reqwest::RequestBuilder {
        if let Some(api_key) = &endpoint.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        for (key, value) in &endpoint.extra_headers {
            req_builder = req_builder.header(key, value);
        }

        req_builder
    }
}

impl Default for OpenAICompatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatClient {
    async fn chat(&self, request: ChatRequest, endpoint: &Endpoint) -> ProviderResult<LLMResponse> {
        let url = endpoint.chat_completions_url();
        debug!(
            "Sending chat request to {} with model {} ({} messages, {} tools)",
            url,
            request.model,
            request.messages.len(),
            request.tools.as_ref().map_or(0, Vec::len)
        );

        let req_builder = self
            .client
            .post(&url)
            .timeout(endpoint.timeout.unwrap_or(self.default_timeout))
            .json(&request);
        let response = self.apply_headers(req_builder, endpoint).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let response_data: ChatCompletionResponse = serde_json::from_str(&body)?;
        self.parse_response(response_data)
    }
}
