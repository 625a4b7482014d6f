//! Progress events published while a consultation round runs

use serde::{Deserialize, Serialize};

/// Phase of a round reported on the thinking channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingStep {
    AnalyzingQuery,
    BuildingContext,
    SelectingExperts,
    AiThinking,
    ExpertsSelected,
    ConsultationCompleted,
}

impl ThinkingStep {
    /// Progress percentage associated with the phase
    pub fn progress(&self) -> u8 {
        match self {
            ThinkingStep::AnalyzingQuery => 10,
            ThinkingStep::BuildingContext => 30,
            ThinkingStep::SelectingExperts => 50,
            ThinkingStep::AiThinking => 70,
            ThinkingStep::ExpertsSelected => 80,
            ThinkingStep::ConsultationCompleted => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingStep::AnalyzingQuery => "analyzing_query",
            ThinkingStep::BuildingContext => "building_context",
            ThinkingStep::SelectingExperts => "selecting_experts",
            ThinkingStep::AiThinking => "ai_thinking",
            ThinkingStep::ExpertsSelected => "experts_selected",
            ThinkingStep::ConsultationCompleted => "consultation_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingEvent {
    pub session_id: String,
    pub step: ThinkingStep,
    pub message: String,
    pub progress: u8,
}

impl ThinkingEvent {
    /// Event carrying the step's standard progress value
    pub fn new(session_id: impl Into<String>, step: ThinkingStep, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            step,
            message: message.into(),
            progress: step.progress(),
        }
    }
}

/// Per-expert lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertStatus {
    Thinking,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertStatusEvent {
    pub session_id: String,
    /// Function name requested by the coordinator
    pub function_name: String,
    /// Display name, or the function name when it maps to no expert
    pub expert_name: String,
    pub status: ExpertStatus,
    pub message: String,
    pub progress: u8,
}

/// Published once when a session finishes through the completion heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub session_id: String,
    pub message: String,
    /// Display names of every expert consulted during the session, first
    /// consultation first
    pub experts_consulted: Vec<String>,
    /// Length of `experts_consulted`
    pub total_experts: usize,
}

impl CompletionEvent {
    pub fn new(
        session_id: impl Into<String>,
        message: impl Into<String>,
        experts_consulted: Vec<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            total_experts: experts_consulted.len(),
            experts_consulted,
        }
    }
}

/// Any event, as delivered through [`super::ProgressBroadcaster::subscribe`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ProgressEvent {
    Thinking(ThinkingEvent),
    ExpertStatus(ExpertStatusEvent),
    Completion(CompletionEvent),
}

impl ProgressEvent {
    pub fn session_id(&self) -> &str {
        match self {
            ProgressEvent::Thinking(e) => &e.session_id,
            ProgressEvent::ExpertStatus(e) => &e.session_id,
            ProgressEvent::Completion(e) => &e.session_id,
        }
    }
}

/// Progress value for an expert status event.
///
/// Expert work occupies the 80..=95 band: expert `index` of `total` reports
/// `80 + index/total * 15` when it starts and `80 + (index+1)/total * 15`
/// when it finishes.
pub fn expert_progress(index: usize, total: usize, finished: bool) -> u8 {
    if total == 0 {
        return ThinkingStep::ExpertsSelected.progress();
    }
    let position = if finished { index + 1 } else { index }.min(total);
    (80 + position * 15 / total) as u8
}
