//! Consultation session data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a consultation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single expert invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertOutcome {
    /// The expert answered
    Success,
    /// The expert exhausted its retries; `response` holds a system notice
    Failed,
    /// The coordinator asked for a function that maps to no expert
    Unrecognized,
}

/// The text one expert contributed to a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertResult {
    /// Catalog identifier (`planner`, `psychologist`, ...), or `unknown`
    pub expert_type: String,
    /// Display name, or the requested function name when unrecognized
    pub expert_name: String,
    /// Verbatim opinion or a substituted notice
    pub response: String,
    pub outcome: ExpertOutcome,
}

impl ExpertResult {
    pub fn success(
        expert_type: impl Into<String>,
        expert_name: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            expert_type: expert_type.into(),
            expert_name: expert_name.into(),
            response: response.into(),
            outcome: ExpertOutcome::Success,
        }
    }

    pub fn failed(
        expert_type: impl Into<String>,
        expert_name: impl Into<String>,
        notice: impl Into<String>,
    ) -> Self {
        Self {
            expert_type: expert_type.into(),
            expert_name: expert_name.into(),
            response: notice.into(),
            outcome: ExpertOutcome::Failed,
        }
    }

    pub fn unrecognized(function_name: impl Into<String>, notice: impl Into<String>) -> Self {
        Self {
            expert_type: "unknown".to_string(),
            expert_name: function_name.into(),
            response: notice.into(),
            outcome: ExpertOutcome::Unrecognized,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExpertOutcome::Success
    }
}

/// Token counters reported by the model endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One recorded round: user input, coordinator decision and expert output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round_number: u32,
    pub user_query: String,
    /// Coordinator's free-text reply
    pub ai_response: String,
    /// Function names the coordinator requested, in request order
    pub experts_called: Vec<String>,
    /// One entry per `experts_called` entry, same order
    pub expert_responses: Vec<ExpertResult>,
    #[serde(default)]
    pub usage: TokenUsage,
    pub timestamp: DateTime<Utc>,
}

/// A multi-round consultation for one original query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: u64,
    pub original_query: String,
    /// Append-only, ordered by `round_number`
    pub rounds: Vec<Round>,
    pub status: SessionStatus,
    pub current_round: u32,
    pub max_rounds: u32,
    /// Why the session failed, when `status` is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an active session positioned at round 1
    pub fn new(user_id: u64, original_query: impl Into<String>, max_rounds: u32) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id,
            original_query: original_query.into(),
            rounds: Vec::new(),
            status: SessionStatus::Active,
            current_round: 1,
            max_rounds: max_rounds.max(1),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether the round counter has reached the limit
    pub fn rounds_exhausted(&self) -> bool {
        self.current_round >= self.max_rounds
    }

    /// Move to the next round; returns false when the limit is reached
    pub fn advance_round(&mut self) -> bool {
        if self.rounds_exhausted() {
            return false;
        }
        self.current_round += 1;
        self.updated_at = Utc::now();
        true
    }

    /// Append a finished round
    pub fn push_round(&mut self, round: Round) {
        self.rounds.push(round);
        self.updated_at = Utc::now();
    }

    /// Transition to `Completed`; no-op unless active
    pub fn complete(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.updated_at = Utc::now();
        true
    }

    /// Transition to `Failed`; no-op unless active
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
        true
    }

    /// Every expert result recorded so far, oldest first
    pub fn expert_results(&self) -> impl Iterator<Item = &ExpertResult> {
        self.rounds.iter().flat_map(|r| r.expert_responses.iter())
    }

    /// Display names of the experts consulted across all rounds, in order of
    /// first appearance. Calls to unknown functions are left out.
    pub fn experts_consulted(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for result in self.expert_results() {
            if result.outcome == ExpertOutcome::Unrecognized {
                continue;
            }
            if !names.contains(&result.expert_name) {
                names.push(result.expert_name.clone());
            }
        }
        names
    }

    /// Take over a terminal status that `stored` reached while this copy was
    /// still active. Returns true when the status changed.
    pub fn adopt_terminal_status(&mut self, stored: &Session) -> bool {
        if !self.is_active() || stored.is_active() {
            return false;
        }
        self.status = stored.status;
        self.failure_reason = stored.failure_reason.clone();
        self.updated_at = Utc::now();
        true
    }

    /// Token usage summed over all rounds
    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for round in &self.rounds {
            total.add(&round.usage);
        }
        total
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            user_id: self.user_id,
            original_query: self.original_query.clone(),
            status: self.status,
            rounds: self.rounds.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Lightweight listing entry for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: u64,
    pub original_query: String,
    pub status: SessionStatus,
    pub rounds: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
