//! Expert invocation with bounded retries

use crate::catalog::{ExpertCatalog, ExpertConfig};
use crate::error::ExpertUnavailable;
use expert_panel_core::config::{ModelConfig, RetryConfig};
use expert_panel_core::utils::truncate_chars;
use expert_panel_providers::{
    ChatRequest, Endpoint, InvocationErrorKind, LLMProvider, Message, ProviderError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An opinion already given in this consultation, offered to later experts
#[derive(Debug, Clone, PartialEq)]
pub struct PriorOpinion {
    pub expert_name: String,
    pub content: String,
}

impl PriorOpinion {
    pub fn new(expert_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            expert_name: expert_name.into(),
            content: content.into(),
        }
    }
}

/// How often and how patiently to retry a failed expert call.
///
/// After failed attempt `n` the invoker waits `n * backoff_step` before the
/// next one; no wait follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_step_ms))
    }
}

/// Runs single expert consultations against the model endpoint
pub struct ExpertInvoker {
    provider: Arc<dyn LLMProvider>,
    catalog: Arc<ExpertCatalog>,
    model: ModelConfig,
    endpoint: Endpoint,
    retry: RetryPolicy,
    prior_context_chars: usize,
}

impl ExpertInvoker {
    /// `model` supplies the expert model name, sampling and endpoint
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        catalog: Arc<ExpertCatalog>,
        model: ModelConfig,
    ) -> Self {
        let endpoint = Endpoint::from_model_config(&model);
        Self {
            provider,
            catalog,
            model,
            endpoint,
            retry: RetryPolicy::default(),
            prior_context_chars: 200,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_prior_context_chars(mut self, chars: usize) -> Self {
        self.prior_context_chars = chars;
        self
    }

    pub fn catalog(&self) -> &Arc<ExpertCatalog> {
        &self.catalog
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// The user message sent to an expert
    pub fn build_prompt(&self, expert: &ExpertConfig, query: &str, prior: &[PriorOpinion]) -> String {
        let mut prompt = format!(
            "As the {}, please give your professional advice on the following question:\n\n\
             Question: {}\n\n",
            expert.name, query
        );

        if !prior.is_empty() {
            prompt.push_str("Views from other experts:\n");
            for (index, opinion) in prior.iter().enumerate() {
                prompt.push_str(&format!(
                    "{}. {}: {}\n",
                    index + 1,
                    opinion.expert_name,
                    truncate_chars(&opinion.content, self.prior_context_chars)
                ));
            }
            prompt.push_str(
                "\nBuilding on the other experts' views, offer insights and advice from your own professional angle.\n",
            );
        }

        prompt
    }

    /// Ask one expert for an opinion.
    ///
    /// Returns the expert's non-blank reply, or [`ExpertUnavailable`] once
    /// every attempt has failed. An unknown `expert_type` fails at once
    /// without calling the model.
    pub async fn consult(
        &self,
        expert_type: &str,
        query: &str,
        prior: &[PriorOpinion],
    ) -> Result<String, ExpertUnavailable> {
        let expert = self.catalog.require(expert_type)?;

        let messages = vec![
            Message::system(expert.system_prompt.clone()),
            Message::user(self.build_prompt(expert, query, prior)),
        ];
        let request = ChatRequest::for_model(&self.model, messages);

        let mut last_error = None;
        for attempt in 1..=self.retry.max_attempts {
            debug!(
                "Consulting {} (attempt {}/{})",
                expert.name, attempt, self.retry.max_attempts
            );

            let error = match self.provider.chat(request.clone(), &self.endpoint).await {
                Ok(response) => match response.text() {
                    Some(text) => {
                        info!("{} answered on attempt {}", expert.name, attempt);
                        return Ok(text.to_string());
                    }
                    None => ProviderError::EmptyResponse(format!("{} returned no content", expert.name)),
                },
                Err(e) => e,
            };

            warn!(
                "{} attempt {}/{} failed ({}): {}",
                expert.name,
                attempt,
                self.retry.max_attempts,
                error.kind(),
                error
            );
            last_error = Some(error);

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        let (kind, message) = match last_error {
            Some(e) => (e.kind(), e.to_string()),
            None => (InvocationErrorKind::Unknown, "no attempt was made".to_string()),
        };
        Err(ExpertUnavailable {
            expert_type: expert.expert_type.clone(),
            expert_name: expert.name.clone(),
            kind,
            message,
            attempts: self.retry.max_attempts,
        })
    }
}
