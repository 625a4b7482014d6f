//! In-process provider doubles shared by the unit tests

use async_trait::async_trait;
use expert_panel_core::config::ModelConfig;
use expert_panel_experts::{ExpertCatalog, ExpertInvoker};
use expert_panel_providers::{
    ChatRequest, Endpoint, LLMProvider, LLMResponse, ProviderResult, ToolCallRequest,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Handler = dyn Fn(&ChatRequest) -> ProviderResult<LLMResponse> + Send + Sync;

/// Answers every request through a closure and records what it saw
pub struct FnProvider {
    handler: Box<Handler>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FnProvider {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ChatRequest) -> ProviderResult<LLMResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LLMProvider for FnProvider {
    async fn chat(&self, request: ChatRequest, _endpoint: &Endpoint) -> ProviderResult<LLMResponse> {
        let response = (self.handler)(&request);
        self.requests.lock().push(request);
        response
    }
}

pub fn text(content: &str) -> ProviderResult<LLMResponse> {
    Ok(LLMResponse {
        content: Some(content.to_string()),
        ..Default::default()
    })
}

pub fn call(id: &str, function: &str, query: &str) -> ToolCallRequest {
    let mut args = HashMap::new();
    args.insert("query".to_string(), serde_json::json!(query));
    ToolCallRequest::new(id, function, args)
}

pub fn call_without_query(id: &str, function: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, function, HashMap::new())
}

/// Display name of the built-in expert whose system prompt opens `request`
pub fn expert_name_of(request: &ChatRequest) -> String {
    let system = request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    ExpertCatalog::builtin()
        .iter()
        .find(|e| e.system_prompt == system)
        .map(|e| e.name.clone())
        .unwrap_or_else(|| "coordinator".to_string())
}

pub fn invoker(provider: Arc<FnProvider>) -> ExpertInvoker {
    let model = ModelConfig {
        model: "expert-model".to_string(),
        max_tokens: 1500,
        ..ModelConfig::default()
    };
    ExpertInvoker::new(provider, Arc::new(ExpertCatalog::builtin()), model)
}
