//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for expert-panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model used for the coordinating call of each round
    #[serde(default)]
    pub coordinator: ModelConfig,
    /// Model used for expert invocations; empty fields inherit from `coordinator`
    #[serde(default = "default_expert_model_config")]
    pub experts: ModelConfig,
    /// Consultation behaviour
    #[serde(default)]
    pub consultation: ConsultationConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: ModelConfig::default(),
            experts: default_expert_model_config(),
            consultation: ConsultationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Expert model settings with empty endpoint fields filled from the coordinator.
    pub fn effective_expert_model(&self) -> ModelConfig {
        let mut experts = self.experts.clone();
        if experts.model.trim().is_empty() {
            experts.model = self.coordinator.model.clone();
        }
        if experts.api_base.trim().is_empty() {
            experts.api_base = self.coordinator.api_base.clone();
        }
        if experts.api_key.trim().is_empty() {
            experts.api_key = self.coordinator.api_key.clone();
        }
        for (key, value) in &self.coordinator.extra_headers {
            experts
                .extra_headers
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        experts
    }
}

/// Model endpoint and sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name sent in the request body
    #[serde(default)]
    pub model: String,
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    #[serde(default)]
    pub api_base: String,
    /// Bearer credential
    #[serde(default)]
    pub api_key: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum completion tokens
    #[serde(default = "default_coordinator_max_tokens")]
    pub max_tokens: u32,
    /// Extra HTTP headers sent with every request
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_coordinator_max_tokens() -> u32 {
    2000
}

fn default_expert_max_tokens() -> u32 {
    1500
}

fn default_request_timeout() -> u64 {
    120
}

fn default_expert_model_config() -> ModelConfig {
    ModelConfig {
        model: String::new(),
        api_base: String::new(),
        max_tokens: default_expert_max_tokens(),
        ..ModelConfig::default()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "doubao-seed-1-6-flash-250715".to_string(),
            api_base: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_coordinator_max_tokens(),
            extra_headers: HashMap::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Consultation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationConfig {
    /// Default round limit for new sessions
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Invoke the experts of one round concurrently
    #[serde(default = "default_true")]
    pub parallel_dispatch: bool,
    /// Expert retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Phrases in a coordinator reply that close the consultation
    #[serde(default = "default_completion_phrases")]
    pub completion_phrases: Vec<String>,
    /// Characters kept from each earlier opinion when briefing an expert
    #[serde(default = "default_prior_context_chars")]
    pub prior_context_chars: usize,
    /// Idle time after which finished sessions may be purged
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,
    /// Persist sessions as JSON files in this directory instead of memory
    #[serde(default)]
    pub sessions_dir: Option<String>,
}

fn default_max_rounds() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

fn default_prior_context_chars() -> usize {
    200
}

/// Closing phrases recognised by the keyword completion detector.
pub fn default_completion_phrases() -> Vec<String> {
    [
        "consultation concluded",
        "consultation is complete",
        "the recommendations are complete",
        "the plan is complete",
        "i hope this helps",
        "hope these suggestions help",
        "if you have any other questions",
        "that concludes our advice",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ConsultationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            parallel_dispatch: true,
            retry: RetryConfig::default(),
            completion_phrases: default_completion_phrases(),
            prior_context_chars: default_prior_context_chars(),
            session_ttl_secs: None,
            sessions_dir: None,
        }
    }
}

/// Expert retry policy: linear backoff of `attempt * backoff_step_ms`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_step_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expert_model_inherits_coordinator_endpoint() {
        let mut config = Config::default();
        config.coordinator.api_key = "sk-coordinator".to_string();
        config
            .coordinator
            .extra_headers
            .insert("X-Team".to_string(), "admissions".to_string());

        let experts = config.effective_expert_model();
        assert_eq!(experts.model, config.coordinator.model);
        assert_eq!(experts.api_base, config.coordinator.api_base);
        assert_eq!(experts.api_key, "sk-coordinator");
        assert_eq!(experts.max_tokens, 1500);
        assert_eq!(experts.extra_headers.get("X-Team").unwrap(), "admissions");
    }

    #[test]
    fn test_expert_model_keeps_own_endpoint() {
        let mut config = Config::default();
        config.experts.model = "expert-model".to_string();
        config.experts.api_base = "http://experts.local/v1".to_string();

        let experts = config.effective_expert_model();
        assert_eq!(experts.model, "expert-model");
        assert_eq!(experts.api_base, "http://experts.local/v1");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"consultation":{"max_rounds":4}}"#).unwrap();
        assert_eq!(config.consultation.max_rounds, 4);
        assert_eq!(config.consultation.retry.max_attempts, 3);
        assert_eq!(config.consultation.retry.backoff_step_ms, 2000);
        assert!(config.consultation.parallel_dispatch);
        assert_eq!(config.experts.max_tokens, 1500);
        assert_eq!(config.coordinator.max_tokens, 2000);
    }
}
