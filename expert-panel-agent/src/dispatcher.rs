//! Executes the coordinator's function calls as expert consultations

use expert_panel_core::bus::{expert_progress, ExpertStatus, ExpertStatusEvent, ProgressBroadcaster};
use expert_panel_core::session::ExpertResult;
use expert_panel_experts::{ExpertInvoker, PriorOpinion};
use expert_panel_providers::ToolCallRequest;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Turns tool calls into [`ExpertResult`]s, one per call and in call order
pub struct ToolDispatcher {
    invoker: Arc<ExpertInvoker>,
    broadcaster: Arc<ProgressBroadcaster>,
    parallel: bool,
}

impl ToolDispatcher {
    pub fn new(invoker: Arc<ExpertInvoker>, broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self {
            invoker,
            broadcaster,
            parallel: true,
        }
    }

    /// Run calls one after another instead of concurrently
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Display name for a call, or the raw function name when unknown
    fn display_name(&self, call: &ToolCallRequest) -> String {
        self.invoker
            .catalog()
            .resolve_function(&call.name)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| call.name.clone())
    }

    fn emit_started(&self, session_id: &str, call: &ToolCallRequest, index: usize, total: usize) {
        let expert_name = self.display_name(call);
        info!("Expert call: {} ({})", call.name, expert_name);
        self.broadcaster.emit_expert_status(ExpertStatusEvent {
            session_id: session_id.to_string(),
            function_name: call.name.clone(),
            message: format!("{} is thinking", expert_name),
            expert_name,
            status: ExpertStatus::Thinking,
            progress: expert_progress(index, total, false),
        });
    }

    fn emit_finished(
        &self,
        session_id: &str,
        call: &ToolCallRequest,
        result: &ExpertResult,
        index: usize,
        total: usize,
    ) {
        let (status, message) = if result.is_success() {
            (
                ExpertStatus::Completed,
                format!("{} has answered", result.expert_name),
            )
        } else {
            (
                ExpertStatus::Failed,
                format!("{} could not answer", result.expert_name),
            )
        };
        self.broadcaster.emit_expert_status(ExpertStatusEvent {
            session_id: session_id.to_string(),
            function_name: call.name.clone(),
            expert_name: result.expert_name.clone(),
            status,
            message,
            progress: expert_progress(index, total, true),
        });
    }

    /// Consult the expert behind one call. Never fails: problems become
    /// notice results.
    async fn run_call(
        &self,
        call: &ToolCallRequest,
        fallback_query: &str,
        prior: &[PriorOpinion],
    ) -> ExpertResult {
        let Some(expert) = self.invoker.catalog().resolve_function(&call.name) else {
            warn!("Coordinator requested unknown function: {}", call.name);
            return ExpertResult::unrecognized(
                call.name.clone(),
                format!(
                    "[System notice] No expert is available for function '{}'.",
                    call.name
                ),
            );
        };

        let problems = serde_json::to_value(&call.arguments)
            .map(|args| expert.function.validate_arguments(&args))
            .unwrap_or_default();
        if !problems.is_empty() {
            warn!(
                "Call {} to {} has invalid arguments ({}), using the round input",
                call.id,
                call.name,
                problems.join("; ")
            );
        }

        let query = call.string_argument("query").unwrap_or(fallback_query);
        match self.invoker.consult(&expert.expert_type, query, prior).await {
            Ok(response) => ExpertResult::success(&expert.expert_type, &expert.name, response),
            Err(unavailable) => {
                warn!("{}", unavailable);
                ExpertResult::failed(&expert.expert_type, &expert.name, unavailable.notice())
            }
        }
    }

    /// Execute every call for a round.
    ///
    /// `fallback_query` is used when a call carries no `query` argument.
    /// `prior` holds opinions from earlier rounds; in sequential mode the
    /// opinions gathered earlier in this round are appended to it.
    pub async fn dispatch(
        &self,
        session_id: &str,
        tool_calls: &[ToolCallRequest],
        fallback_query: &str,
        prior: &[PriorOpinion],
    ) -> Vec<ExpertResult> {
        let total = tool_calls.len();

        if self.parallel {
            for (index, call) in tool_calls.iter().enumerate() {
                self.emit_started(session_id, call, index, total);
            }

            let results = join_all(
                tool_calls
                    .iter()
                    .map(|call| self.run_call(call, fallback_query, prior)),
            )
            .await;

            for (index, (call, result)) in tool_calls.iter().zip(&results).enumerate() {
                self.emit_finished(session_id, call, result, index, total);
            }
            return results;
        }

        let mut context = prior.to_vec();
        let mut results = Vec::with_capacity(total);
        for (index, call) in tool_calls.iter().enumerate() {
            self.emit_started(session_id, call, index, total);
            let result = self.run_call(call, fallback_query, &context).await;
            self.emit_finished(session_id, call, &result, index, total);

            if result.is_success() {
                context.push(PriorOpinion::new(&result.expert_name, &result.response));
            }
            results.push(result);
        }
        results
    }
}
