//! Consultation manager: session lifecycle and round execution

use crate::completion::{CompletionDetector, KeywordCompletionDetector};
use crate::context::ContextBuilder;
use crate::dispatcher::ToolDispatcher;
use crate::error::{ConsultationError, ConsultationResult};
use chrono::Utc;
use expert_panel_core::bus::{CompletionEvent, ProgressBroadcaster, ThinkingEvent, ThinkingStep};
use expert_panel_core::config::{Config, ModelConfig};
use expert_panel_core::session::{
    ExpertResult, FileSessionStore, InMemorySessionStore, Round, Session, SessionStatus,
    SessionStore, SessionSummary, TokenUsage,
};
use expert_panel_core::utils::truncate_chars;
use expert_panel_experts::{ExpertCatalog, ExpertInvoker, PriorOpinion, RetryPolicy};
use expert_panel_providers::{
    ChatRequest, Endpoint, LLMProvider, LLMResponse, Message, ProviderError,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reply recorded when a session runs out of rounds
pub const ROUND_LIMIT_NOTICE: &str =
    "The maximum number of conversation rounds has been reached. The consultation has ended.";

/// Result of the first round of a consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub session_id: String,
    pub initial_response: String,
    pub experts_called: Vec<String>,
    pub expert_responses: Vec<ExpertResult>,
    pub status: SessionStatus,
    pub is_completed: bool,
}

/// Result of a follow-up round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub session_id: String,
    pub response: String,
    pub experts_called: Vec<String>,
    pub expert_responses: Vec<ExpertResult>,
    pub status: SessionStatus,
    pub round_number: u32,
    pub is_completed: bool,
}

impl From<RoundOutcome> for StartOutcome {
    fn from(round: RoundOutcome) -> Self {
        Self {
            session_id: round.session_id,
            initial_response: round.response,
            experts_called: round.experts_called,
            expert_responses: round.expert_responses,
            status: round.status,
            is_completed: round.is_completed,
        }
    }
}

fn usage_of(response: &LLMResponse) -> TokenUsage {
    TokenUsage {
        prompt_tokens: response.usage_value("prompt_tokens"),
        completion_tokens: response.usage_value("completion_tokens"),
        total_tokens: response.usage_value("total_tokens"),
    }
}

/// Reply assembled from expert results when the coordinator gave none
fn compose_from_results(results: &[ExpertResult]) -> String {
    let mut reply = String::from("Here is what the experts said:\n");
    for result in results {
        let _ = writeln!(reply, "- {}: {}", result.expert_name, result.response);
    }
    reply
}

/// Assembles a [`ConsultationManager`] from configuration and overrides
pub struct ConsultationManagerBuilder {
    config: Config,
    provider: Arc<dyn LLMProvider>,
    catalog: Option<Arc<ExpertCatalog>>,
    store: Option<Arc<dyn SessionStore>>,
    detector: Option<Arc<dyn CompletionDetector>>,
    broadcaster: Option<Arc<ProgressBroadcaster>>,
}

impl ConsultationManagerBuilder {
    pub fn catalog(mut self, catalog: Arc<ExpertCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn CompletionDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn broadcaster(mut self, broadcaster: Arc<ProgressBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Without an explicit store, sessions persist under
    /// `consultation.sessions_dir` when set and stay in memory otherwise.
    pub fn build(self) -> ConsultationResult<ConsultationManager> {
        let consultation = &self.config.consultation;

        let store: Arc<dyn SessionStore> = match (self.store, &consultation.sessions_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileSessionStore::new(dir)?),
            (None, None) => Arc::new(InMemorySessionStore::new()),
        };
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(ExpertCatalog::builtin()));
        let detector = self
            .detector
            .unwrap_or_else(|| Arc::new(KeywordCompletionDetector::from_config(consultation)));
        let broadcaster = self
            .broadcaster
            .unwrap_or_else(|| Arc::new(ProgressBroadcaster::new()));

        let invoker = ExpertInvoker::new(
            Arc::clone(&self.provider),
            Arc::clone(&catalog),
            self.config.effective_expert_model(),
        )
        .with_retry(RetryPolicy::from(&consultation.retry))
        .with_prior_context_chars(consultation.prior_context_chars);
        let dispatcher = ToolDispatcher::new(Arc::new(invoker), Arc::clone(&broadcaster))
            .with_parallel(consultation.parallel_dispatch);

        Ok(ConsultationManager {
            coordinator_endpoint: Endpoint::from_model_config(&self.config.coordinator),
            coordinator: self.config.coordinator.clone(),
            context: ContextBuilder::new(Arc::clone(&catalog)),
            max_rounds: consultation.max_rounds,
            session_ttl: consultation.session_ttl_secs.map(Duration::from_secs),
            provider: self.provider,
            catalog,
            dispatcher,
            detector,
            store,
            broadcaster,
        })
    }
}

/// Runs consultations: creates sessions, executes rounds, ends sessions.
///
/// Sessions are independent. Rounds of one session must not run
/// concurrently; callers await each round before starting the next.
pub struct ConsultationManager {
    provider: Arc<dyn LLMProvider>,
    catalog: Arc<ExpertCatalog>,
    dispatcher: ToolDispatcher,
    context: ContextBuilder,
    detector: Arc<dyn CompletionDetector>,
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    coordinator: ModelConfig,
    coordinator_endpoint: Endpoint,
    max_rounds: u32,
    session_ttl: Option<Duration>,
}

impl ConsultationManager {
    pub fn builder(config: Config, provider: Arc<dyn LLMProvider>) -> ConsultationManagerBuilder {
        ConsultationManagerBuilder {
            config,
            provider,
            catalog: None,
            store: None,
            detector: None,
            broadcaster: None,
        }
    }

    pub fn new(config: Config, provider: Arc<dyn LLMProvider>) -> ConsultationResult<Self> {
        Self::builder(config, provider).build()
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn catalog(&self) -> &Arc<ExpertCatalog> {
        &self.catalog
    }

    /// Create a session without running any round.
    ///
    /// Lets callers register listeners under the new id before [`Self::begin`].
    pub fn open_session(
        &self,
        user_id: u64,
        query: &str,
        max_rounds: Option<u32>,
    ) -> ConsultationResult<String> {
        let session = Session::new(user_id, query, max_rounds.unwrap_or(self.max_rounds));
        self.store.put(&session)?;
        info!(
            "Opened consultation {} for user {} (max {} rounds)",
            session.session_id, user_id, session.max_rounds
        );
        Ok(session.session_id)
    }

    /// Run the first round of an opened session on its original query
    pub async fn begin(&self, session_id: &str) -> ConsultationResult<StartOutcome> {
        let mut session = self.load_active(session_id)?;
        if !session.rounds.is_empty() {
            return Err(ConsultationError::SessionAlreadyStarted(session_id.to_string()));
        }

        let query = session.original_query.clone();
        let outcome = self.process_round(&mut session, &query).await?;
        Ok(outcome.into())
    }

    /// Create a session and run its first round
    pub async fn start(
        &self,
        user_id: u64,
        query: &str,
        max_rounds: Option<u32>,
    ) -> ConsultationResult<StartOutcome> {
        let session_id = self.open_session(user_id, query, max_rounds)?;
        self.begin(&session_id).await
    }

    /// Run the next round with the user's follow-up input.
    ///
    /// Once the round limit is reached the session completes with
    /// [`ROUND_LIMIT_NOTICE`] and no model call is made.
    pub async fn continue_session(
        &self,
        session_id: &str,
        input: &str,
    ) -> ConsultationResult<RoundOutcome> {
        let mut session = self.load_active(session_id)?;

        if !session.advance_round() {
            info!(
                "Session {} reached its round limit ({})",
                session_id, session.max_rounds
            );
            session.complete();
            self.store.put(&session)?;
            return Ok(RoundOutcome {
                session_id: session.session_id.clone(),
                response: ROUND_LIMIT_NOTICE.to_string(),
                experts_called: Vec::new(),
                expert_responses: Vec::new(),
                status: session.status,
                round_number: session.current_round,
                is_completed: true,
            });
        }

        self.process_round(&mut session, input).await
    }

    /// Mark a session completed and drop its listeners. Returns false when
    /// it does not exist or has already ended.
    ///
    /// A round already in flight still finishes and is recorded, but the
    /// session stays completed.
    pub fn end_session(&self, session_id: &str) -> ConsultationResult<bool> {
        let Some(mut session) = self.store.get(session_id)? else {
            return Ok(false);
        };
        if !session.complete() {
            return Ok(false);
        }
        self.store.put(&session)?;
        self.broadcaster.clear_session(session_id);
        info!("Session {} ended by caller", session_id);
        Ok(true)
    }

    /// Snapshot of a session
    pub fn get_status(&self, session_id: &str) -> ConsultationResult<Option<Session>> {
        Ok(self.store.get(session_id)?)
    }

    /// Sessions, newest first, optionally restricted to one user
    pub fn list_sessions(&self, user_id: Option<u64>) -> ConsultationResult<Vec<SessionSummary>> {
        let mut sessions = self.store.list()?;
        if let Some(user_id) = user_id {
            sessions.retain(|s| s.user_id == user_id);
        }
        Ok(sessions)
    }

    /// Drop ended sessions idle for longer than the configured TTL, along
    /// with their listeners. Returns how many were removed.
    pub fn purge_idle_sessions(&self) -> ConsultationResult<usize> {
        let Some(ttl) = self.session_ttl else {
            return Ok(0);
        };
        let now = Utc::now();

        let mut purged = 0;
        for summary in self.store.list()? {
            if summary.status == SessionStatus::Active {
                continue;
            }
            let idle = (now - summary.updated_at).to_std().unwrap_or_default();
            if idle > ttl && self.store.remove(&summary.session_id)? {
                self.broadcaster.clear_session(&summary.session_id);
                purged += 1;
            }
        }

        if purged > 0 {
            info!("Purged {} idle sessions", purged);
        }
        Ok(purged)
    }

    fn load_active(&self, session_id: &str) -> ConsultationResult<Session> {
        let session = self
            .store
            .get(session_id)?
            .ok_or_else(|| ConsultationError::SessionNotFound(session_id.to_string()))?;
        if !session.is_active() {
            return Err(ConsultationError::SessionAlreadyCompleted(
                session_id.to_string(),
            ));
        }
        Ok(session)
    }

    /// Pick up an end recorded by another caller while a round was running
    fn sync_terminal_status(&self, session: &mut Session) -> ConsultationResult<()> {
        if let Some(stored) = self.store.get(&session.session_id)? {
            if session.adopt_terminal_status(&stored) {
                info!(
                    "Session {} ended while round {} was running",
                    session.session_id, session.current_round
                );
            }
        }
        Ok(())
    }

    fn thinking(&self, session_id: &str, step: ThinkingStep, message: impl Into<String>) {
        self.broadcaster
            .emit_thinking(ThinkingEvent::new(session_id, step, message));
    }

    async fn ask_coordinator(&self, request: ChatRequest) -> Result<LLMResponse, ProviderError> {
        debug!(
            "Coordinator request: {} messages, {} tools",
            request.messages.len(),
            request.tools.as_ref().map_or(0, Vec::len)
        );
        self.provider.chat(request, &self.coordinator_endpoint).await
    }

    /// Second coordinator pass turning expert results into one reply
    async fn synthesize(
        &self,
        messages: Vec<Message>,
        response: &LLMResponse,
        results: &[ExpertResult],
        usage: &mut TokenUsage,
    ) -> String {
        let mut messages = messages;
        messages.push(Message::assistant_with_tool_calls(
            response.content.clone().unwrap_or_default(),
            response.tool_calls.clone(),
        ));
        for (call, result) in response.tool_calls.iter().zip(results) {
            messages.push(Message::tool(
                format!("{}: {}", result.expert_name, result.response),
                call.id.clone(),
            ));
        }

        let request = ChatRequest::for_model(&self.coordinator, messages);
        match self.ask_coordinator(request).await {
            Ok(synthesis) => {
                usage.add(&usage_of(&synthesis));
                match synthesis.text() {
                    Some(text) => text.to_string(),
                    None => compose_from_results(results),
                }
            }
            Err(e) => {
                warn!("Synthesis pass failed ({}): {}", e.kind(), e);
                compose_from_results(results)
            }
        }
    }

    async fn process_round(
        &self,
        session: &mut Session,
        input: &str,
    ) -> ConsultationResult<RoundOutcome> {
        let session_id = session.session_id.clone();
        let round_number = session.current_round;
        info!(
            "Session {} round {}/{}: {}",
            session_id,
            round_number,
            session.max_rounds,
            truncate_chars(input, 80)
        );

        self.thinking(&session_id, ThinkingStep::AnalyzingQuery, "Analyzing your question");
        let messages = self.context.build_messages(session, input);
        self.thinking(
            &session_id,
            ThinkingStep::BuildingContext,
            "Reviewing the conversation so far",
        );
        self.thinking(
            &session_id,
            ThinkingStep::SelectingExperts,
            "Choosing which experts to consult",
        );

        let request = ChatRequest::for_model(&self.coordinator, messages.clone())
            .with_tools(self.catalog.function_definitions());
        self.thinking(&session_id, ThinkingStep::AiThinking, "The coordinator is thinking");

        let response = match self.ask_coordinator(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    "Coordinator failed in session {} ({}): {}",
                    session_id,
                    e.kind(),
                    e
                );
                self.sync_terminal_status(session)?;
                session.fail(e.to_string());
                self.store.put(session)?;
                self.thinking(
                    &session_id,
                    ThinkingStep::ConsultationCompleted,
                    "The consultation could not continue",
                );
                return Err(ConsultationError::CoordinatorInvocationFailure {
                    session_id,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        };
        let mut usage = usage_of(&response);

        let experts_called: Vec<String> =
            response.tool_calls.iter().map(|c| c.name.clone()).collect();
        let mut expert_responses = Vec::new();
        let reply = if response.has_tool_calls() {
            self.thinking(
                &session_id,
                ThinkingStep::ExpertsSelected,
                format!("Consulting {} expert(s)", experts_called.len()),
            );

            let prior: Vec<PriorOpinion> = session
                .expert_results()
                .filter(|r| r.is_success())
                .map(|r| PriorOpinion::new(&r.expert_name, &r.response))
                .collect();
            expert_responses = self
                .dispatcher
                .dispatch(&session_id, &response.tool_calls, input, &prior)
                .await;

            match response.text() {
                Some(text) => text.to_string(),
                None => {
                    self.synthesize(messages, &response, &expert_responses, &mut usage)
                        .await
                }
            }
        } else {
            response.text().unwrap_or_default().to_string()
        };

        let should_complete = self.detector.should_complete(&reply);

        session.push_round(Round {
            round_number,
            user_query: input.to_string(),
            ai_response: reply.clone(),
            experts_called: experts_called.clone(),
            expert_responses: expert_responses.clone(),
            usage,
            timestamp: Utc::now(),
        });

        self.sync_terminal_status(session)?;
        if should_complete && session.complete() {
            info!("Session {} completed after round {}", session_id, round_number);
            self.broadcaster.emit_completion(CompletionEvent::new(
                session_id.clone(),
                "The consultation is complete",
                session.experts_consulted(),
            ));
        }
        self.store.put(session)?;

        self.thinking(
            &session_id,
            ThinkingStep::ConsultationCompleted,
            "Round complete",
        );

        Ok(RoundOutcome {
            session_id,
            response: reply,
            experts_called,
            expert_responses,
            status: session.status,
            round_number,
            is_completed: !session.is_active(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{call, expert_name_of, text, FnProvider};
    use expert_panel_core::bus::ProgressEvent;
    use expert_panel_providers::{InvocationErrorKind, ProviderResult, ToolCallRequest};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    fn config() -> Config {
        let mut config = Config::default();
        config.coordinator.model = "coordinator-model".to_string();
        config.coordinator.api_base = "http://coordinator.test".to_string();
        config.experts.model = "expert-model".to_string();
        config
    }

    /// Coordinator replies come from a script; experts echo their name
    fn scripted(coordinator: Vec<ProviderResult<LLMResponse>>) -> Arc<FnProvider> {
        let script = Mutex::new(VecDeque::from(coordinator));
        FnProvider::new(move |request| {
            if request.model == "coordinator-model" {
                script
                    .lock()
                    .pop_front()
                    .unwrap_or_else(|| text("script exhausted"))
            } else {
                text(&format!("{} advice", expert_name_of(request)))
            }
        })
    }

    fn with_calls(content: Option<&str>, calls: Vec<ToolCallRequest>) -> ProviderResult<LLMResponse> {
        let mut usage = HashMap::new();
        usage.insert("total_tokens".to_string(), 100);
        Ok(LLMResponse {
            content: content.map(str::to_string),
            tool_calls: calls,
            finish_reason: "tool_calls".to_string(),
            usage,
        })
    }

    fn manager(provider: Arc<FnProvider>) -> ConsultationManager {
        ConsultationManager::new(config(), provider).unwrap()
    }

    #[tokio::test]
    async fn test_start_with_experts_records_round() {
        let provider = scripted(vec![with_calls(
            Some("Combining the views: run an open day."),
            vec![
                call("c1", "consult_recruitment_planner", "campaign ideas"),
                call("c2", "consult_parent_representative", "what parents want"),
            ],
        )]);
        let manager = manager(provider.clone());

        let outcome = manager.start(1, "How can we attract families?", None).await.unwrap();
        assert_eq!(outcome.initial_response, "Combining the views: run an open day.");
        assert_eq!(
            outcome.experts_called,
            vec!["consult_recruitment_planner", "consult_parent_representative"]
        );
        assert_eq!(outcome.status, SessionStatus::Active);
        assert!(!outcome.is_completed);

        let session = manager.get_status(&outcome.session_id).unwrap().unwrap();
        assert_eq!(session.rounds.len(), 1);
        let round = &session.rounds[0];
        assert_eq!(round.expert_responses.len(), round.experts_called.len());
        assert_eq!(round.expert_responses[0].response, "Recruitment Planner advice");
        assert_eq!(round.usage.total_tokens, 100);

        let coordinator_request = &provider.requests()[0];
        assert_eq!(coordinator_request.tools.as_ref().map(Vec::len), Some(6));
        assert_eq!(coordinator_request.tool_choice.as_deref(), Some("auto"));
        assert_eq!(coordinator_request.max_tokens, 2000);
    }

    #[tokio::test]
    async fn test_synthesis_pass_when_coordinator_returns_only_calls() {
        let provider = scripted(vec![
            with_calls(None, vec![call("c1", "consult_teacher", "settling in")]),
            text("Integrated plan from the teacher's advice."),
        ]);
        let manager = manager(provider.clone());

        let outcome = manager.start(1, "Settling-in plan?", None).await.unwrap();
        assert_eq!(outcome.initial_response, "Integrated plan from the teacher's advice.");

        let requests = provider.requests();
        let synthesis = requests
            .iter()
            .filter(|r| r.model == "coordinator-model")
            .nth(1)
            .unwrap();
        assert!(synthesis.tools.is_none());
        let tool_message = synthesis.messages.last().unwrap();
        assert_eq!(tool_message.role, "tool");
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_message.content.contains("Lead Teacher advice"));
    }

    #[tokio::test]
    async fn test_failed_synthesis_composes_reply_from_results() {
        let provider = scripted(vec![
            with_calls(None, vec![call("c1", "consult_director", "rota")]),
            Err(ProviderError::EmptyResponse("nothing".to_string())),
        ]);
        let manager = manager(provider);

        let outcome = manager.start(1, "Staff rota?", None).await.unwrap();
        assert!(outcome
            .initial_response
            .contains("- Kindergarten Director: Kindergarten Director advice"));
    }

    #[tokio::test]
    async fn test_completion_phrase_ends_session_and_emits_events() {
        let provider = scripted(vec![with_calls(
            Some("Here is your plan. I hope this helps!"),
            vec![call("c1", "consult_investor", "budget")],
        )]);
        let manager = manager(provider);

        let session_id = manager.open_session(9, "Budget for a new class?", None).unwrap();
        let mut rx = manager.broadcaster().subscribe(&session_id);
        let outcome = manager.begin(&session_id).await.unwrap();

        assert!(outcome.is_completed);
        assert_eq!(outcome.status, SessionStatus::Completed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let steps: Vec<ThinkingStep> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Thinking(t) => Some(t.step),
                _ => None,
            })
            .collect();
        assert_eq!(
            steps,
            vec![
                ThinkingStep::AnalyzingQuery,
                ThinkingStep::BuildingContext,
                ThinkingStep::SelectingExperts,
                ThinkingStep::AiThinking,
                ThinkingStep::ExpertsSelected,
                ThinkingStep::ConsultationCompleted,
            ]
        );
        let completion = events.iter().find_map(|e| match e {
            ProgressEvent::Completion(c) => Some(c.clone()),
            _ => None,
        });
        let completion = completion.unwrap();
        assert_eq!(completion.experts_consulted, vec!["Investment Analyst"]);
        assert_eq!(completion.total_experts, 1);
        assert!(matches!(events.last(), Some(ProgressEvent::Thinking(t)) if t.progress == 100));

        let err = manager.continue_session(&session_id, "one more").await.unwrap_err();
        assert!(matches!(err, ConsultationError::SessionAlreadyCompleted(_)));
    }

    #[tokio::test]
    async fn test_completion_event_lists_experts_from_every_round() {
        let provider = scripted(vec![
            with_calls(
                Some("First thoughts."),
                vec![
                    call("c1", "consult_investor", "budget"),
                    call("c2", "consult_teacher", "staffing"),
                ],
            ),
            with_calls(
                Some("Final plan. I hope this helps."),
                vec![
                    call("c3", "consult_investor", "payback"),
                    call("c4", "consult_parent_representative", "fees"),
                ],
            ),
        ]);
        let manager = manager(provider);

        let session_id = manager.open_session(3, "Open a second site?", None).unwrap();
        let mut rx = manager.broadcaster().subscribe(&session_id);
        manager.begin(&session_id).await.unwrap();
        let outcome = manager
            .continue_session(&session_id, "And the fees?")
            .await
            .unwrap();
        assert!(outcome.is_completed);

        let mut completions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Completion(c) = event {
                completions.push(c);
            }
        }
        assert_eq!(completions.len(), 1);
        assert_eq!(
            completions[0].experts_consulted,
            vec![
                "Investment Analyst",
                "Lead Teacher",
                "Parent Representative"
            ]
        );
        assert_eq!(completions[0].total_experts, 3);
    }

    #[tokio::test]
    async fn test_end_session_drops_listeners() {
        let manager = manager(scripted(vec![text("What age group?")]));
        let outcome = manager.start(1, "Advice please", None).await.unwrap();
        let mut rx = manager.broadcaster().subscribe(&outcome.session_id);
        assert!(manager.broadcaster().listener_count(&outcome.session_id) > 0);

        assert!(manager.end_session(&outcome.session_id).unwrap());
        assert_eq!(manager.broadcaster().listener_count(&outcome.session_id), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_begin_twice_is_rejected() {
        let manager = manager(scripted(vec![text("Tell me more about your setting.")]));
        let session_id = manager.open_session(1, "Hello", None).unwrap();
        manager.begin(&session_id).await.unwrap();

        let err = manager.begin(&session_id).await.unwrap_err();
        assert!(matches!(err, ConsultationError::SessionAlreadyStarted(_)));
    }

    #[tokio::test]
    async fn test_coordinator_failure_fails_session() {
        let provider = scripted(vec![Err(ProviderError::ApiError {
            status: 401,
            body: "bad key".to_string(),
        })]);
        let manager = manager(provider);

        let err = manager.start(1, "q", None).await.unwrap_err();
        let session_id = match err {
            ConsultationError::CoordinatorInvocationFailure {
                session_id, kind, ..
            } => {
                assert_eq!(kind, InvocationErrorKind::RemoteApi);
                session_id
            }
            other => panic!("unexpected error: {other}"),
        };

        let session = manager.get_status(&session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.rounds.is_empty());
        assert!(session.failure_reason.unwrap().contains("bad key"));
    }

    #[tokio::test]
    async fn test_continue_unknown_session() {
        let manager = manager(scripted(vec![]));
        let err = manager.continue_session("missing", "hi").await.unwrap_err();
        assert!(matches!(err, ConsultationError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_end_session_and_get_status() {
        let manager = manager(scripted(vec![text("What age group?")]));
        let outcome = manager.start(1, "Advice please", None).await.unwrap();

        let first = manager.get_status(&outcome.session_id).unwrap();
        let second = manager.get_status(&outcome.session_id).unwrap();
        assert_eq!(first, second);

        assert!(manager.end_session(&outcome.session_id).unwrap());
        assert!(!manager.end_session(&outcome.session_id).unwrap());
        assert!(!manager.end_session("missing").unwrap());

        let session = manager.get_status(&outcome.session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_sessions_filters_by_user() {
        let manager = manager(scripted(vec![]));
        manager.open_session(1, "first", None).unwrap();
        manager.open_session(2, "second", None).unwrap();
        manager.open_session(1, "third", None).unwrap();

        assert_eq!(manager.list_sessions(None).unwrap().len(), 3);
        let mine = manager.list_sessions(Some(1)).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|s| s.user_id == 1));
    }

    #[tokio::test]
    async fn test_purge_idle_sessions() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut config = config();
        config.consultation.session_ttl_secs = Some(60);
        let manager = ConsultationManager::builder(config, scripted(vec![]))
            .store(store.clone())
            .build()
            .unwrap();

        let mut stale = Session::new(1, "old", 12);
        stale.complete();
        stale.updated_at = Utc::now() - chrono::Duration::seconds(3600);
        store.put(&stale).unwrap();
        manager.broadcaster().subscribe(&stale.session_id);

        let mut idle_but_active = Session::new(1, "still open", 12);
        idle_but_active.updated_at = Utc::now() - chrono::Duration::seconds(3600);
        store.put(&idle_but_active).unwrap();

        let fresh_id = manager.open_session(1, "new", None).unwrap();
        manager.end_session(&fresh_id).unwrap();

        assert_eq!(manager.purge_idle_sessions().unwrap(), 1);
        assert!(manager.get_status(&stale.session_id).unwrap().is_none());
        assert!(manager.get_status(&idle_but_active.session_id).unwrap().is_some());
        assert!(manager.get_status(&fresh_id).unwrap().is_some());
        assert_eq!(manager.broadcaster().listener_count(&stale.session_id), 0);
    }

    #[tokio::test]
    async fn test_purge_disabled_without_ttl() {
        let manager = manager(scripted(vec![]));
        let id = manager.open_session(1, "q", None).unwrap();
        manager.end_session(&id).unwrap();
        assert_eq!(manager.purge_idle_sessions().unwrap(), 0);
    }
}
