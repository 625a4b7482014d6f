//! Provider trait and chat-completion wire types

use async_trait::async_trait;
use expert_panel_core::config::ModelConfig;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Error type for provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Classify the failure for callers that only need the reason class
    pub fn kind(&self) -> InvocationErrorKind {
        match self {
            ProviderError::Http(e) if e.is_decode() => InvocationErrorKind::Unknown,
            ProviderError::Http(_) => InvocationErrorKind::Network,
            ProviderError::ApiError { .. } => InvocationErrorKind::RemoteApi,
            ProviderError::EmptyResponse(_) => InvocationErrorKind::EmptyResponse,
            ProviderError::Json(_) | ProviderError::InvalidResponse(_) => {
                InvocationErrorKind::Unknown
            }
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Reason class of a failed model invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationErrorKind {
    /// No response was received (connect failure, timeout, reset)
    Network,
    /// The endpoint answered with a non-success status
    RemoteApi,
    /// The endpoint answered without usable content
    EmptyResponse,
    Unknown,
}

impl InvocationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationErrorKind::Network => "network",
            InvocationErrorKind::RemoteApi => "remote-api",
            InvocationErrorKind::EmptyResponse => "empty-response",
            InvocationErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for InvocationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call request from the LLM
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub call_type: String,
    pub name: String,
    pub arguments: HashMap<String, serde_json::Value>,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            name: name.into(),
            arguments,
        }
    }

    /// A non-blank string argument, trimmed
    pub fn string_argument(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Serialize for ToolCallRequest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        #[derive(Serialize)]
        struct Function<'a> {
            name: &'a str,
            arguments: String,
        }

        let arguments = serde_json::to_string(&self.arguments).unwrap_or_else(|_| "{}".to_string());

        let mut state = serializer.serialize_struct("ToolCallRequest", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.call_type)?;
        state.serialize_field(
            "function",
            &Function {
                name: &self.name,
                arguments,
            },
        )?;
        state.end()
    }
}

/// Decode `function.arguments`, which endpoints send as a JSON-encoded string.
///
/// Unparseable payloads are kept under a `raw` key instead of failing the
/// whole response.
pub(crate) fn normalize_arguments(value: serde_json::Value) -> HashMap<String, serde_json::Value> {
    match value {
        serde_json::Value::String(raw) => {
            serde_json::from_str::<HashMap<String, serde_json::Value>>(&raw).unwrap_or_else(|_| {
                let mut map = HashMap::new();
                map.insert("raw".to_string(), serde_json::Value::String(raw));
                map
            })
        }
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

impl<'de> Deserialize<'de> for ToolCallRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Function {
            name: String,
            #[serde(default)]
            arguments: serde_json::Value,
        }

        #[derive(Deserialize)]
        struct Helper {
            id: String,
            #[serde(rename = "type", default = "default_call_type")]
            call_type: String,
            function: Function,
        }

        fn default_call_type() -> String {
            "function".to_string()
        }

        let helper = Helper::deserialize(deserializer)?;
        Ok(Self {
            id: helper.id,
            call_type: helper.call_type,
            name: helper.function.name,
            arguments: normalize_arguments(helper.function.arguments),
        })
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default = "default_finish_reason")]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: HashMap<String, i64>,
}

fn default_finish_reason() -> String {
    "stop".to_string()
}

impl LLMResponse {
    /// Check if response contains tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Content as returned, or `None` when it is missing or blank
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn usage_value(&self, key: &str) -> i64 {
        self.usage.get(key).copied().unwrap_or(0)
    }
}

/// A message in the chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Assistant turn that requested tool calls
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role("assistant", content)
        }
    }

    /// Create a tool response message
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role("tool", content)
        }
    }
}

/// One chat-completion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            tool_choice: None,
            temperature: 0.1,
            max_tokens: 2000,
        }
    }

    /// Build a request using the model and sampling settings of a config section
    pub fn for_model(config: &ModelConfig, messages: Vec<Message>) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Self::new(config.model.clone(), messages)
        }
    }

    /// Offer tools with `tool_choice = "auto"`; an empty list offers none
    pub fn with_tools(mut self, tools: Vec<serde_json::Value>) -> Self {
        if tools.is_empty() {
            self.tools = None;
            self.tool_choice = None;
        } else {
            self.tools = Some(tools);
            self.tool_choice = Some("auto".to_string());
        }
        self
    }
}

/// Where and how to send a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    pub api_base: String,
    pub api_key: Option<String>,
    pub extra_headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl Endpoint {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            api_key: Some(config.api_key.clone()).filter(|k| !k.trim().is_empty()),
            extra_headers: config.extra_headers.clone(),
            timeout: Some(Duration::from_secs(config.request_timeout_secs)),
        }
    }

    /// Full URL of the chat-completions route
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request to `endpoint`
    async fn chat(&self, request: ChatRequest, endpoint: &Endpoint) -> ProviderResult<LLMResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_deserializes_string_arguments() {
        let call: ToolCallRequest = serde_json::from_value(serde_json::json!({
            "id": "call_1",
            "type": "function",
            "function": {
                "name": "consult_teacher",
                "arguments": "{\"query\": \"How do we settle new pupils?\"}"
            }
        }))
        .unwrap();

        assert_eq!(call.name, "consult_teacher");
        assert_eq!(call.string_argument("query"), Some("How do we settle new pupils?"));
    }

    #[test]
    fn test_tool_call_keeps_malformed_arguments_raw() {
        let call: ToolCallRequest = serde_json::from_value(serde_json::json!({
            "id": "call_1",
            "function": { "name": "consult_teacher", "arguments": "{not json" }
        }))
        .unwrap();

        assert_eq!(call.call_type, "function");
        assert!(call.string_argument("query").is_none());
        assert_eq!(call.arguments["raw"], "{not json");
    }

    #[test]
    fn test_tool_call_serializes_arguments_as_string() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!("budget"));
        let call = ToolCallRequest::new("call_9", "consult_investor", args);

        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["arguments"], "{\"query\":\"budget\"}");
    }

    #[test]
    fn test_blank_string_argument_is_none() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!("   "));
        let call = ToolCallRequest::new("c", "consult_teacher", args);
        assert!(call.string_argument("query").is_none());
    }

    #[test]
    fn test_text_keeps_surrounding_whitespace() {
        let response = LLMResponse {
            content: Some("\n  Step one.\n  Step two.\n".to_string()),
            ..Default::default()
        };
        assert_eq!(response.text(), Some("\n  Step one.\n  Step two.\n"));

        let blank = LLMResponse {
            content: Some(" \n\t ".to_string()),
            ..Default::default()
        };
        assert!(blank.text().is_none());
        assert!(LLMResponse::default().text().is_none());
    }

    #[test]
    fn test_with_tools_sets_auto_choice() {
        let request = ChatRequest::new("m", vec![Message::user("hi")])
            .with_tools(vec![serde_json::json!({"type": "function"})]);
        assert_eq!(request.tool_choice.as_deref(), Some("auto"));

        let request = ChatRequest::new("m", vec![]).with_tools(vec![]);
        assert!(request.tools.is_none());
        assert!(request.tool_choice.is_none());

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_endpoint_from_model_config() {
        let config = ModelConfig {
            api_base: "https://llm.internal/v1/".to_string(),
            api_key: String::new(),
            request_timeout_secs: 30,
            ..ModelConfig::default()
        };
        let endpoint = Endpoint::from_model_config(&config);

        assert!(endpoint.api_key.is_none());
        assert_eq!(endpoint.timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            endpoint.chat_completions_url(),
            "https://llm.internal/v1/chat/completions"
        );
    }

    #[test]
    fn test_error_kinds() {
        let err = ProviderError::ApiError {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.kind(), InvocationErrorKind::RemoteApi);
        assert_eq!(err.to_string(), "API error: HTTP 503: overloaded");
        assert_eq!(
            ProviderError::EmptyResponse("no choices".to_string()).kind(),
            InvocationErrorKind::EmptyResponse
        );
        assert_eq!(
            ProviderError::InvalidResponse("x".to_string()).kind(),
            InvocationErrorKind::Unknown
        );
        assert_eq!(InvocationErrorKind::RemoteApi.as_str(), "remote-api");
    }
}
