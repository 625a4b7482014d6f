//! Progress broadcasting
//!
//! Consultation rounds publish their progress on three per-session channels:
//! coordinator phases (thinking), per-expert status, and session completion.

pub mod broadcaster;
pub mod events;

pub use broadcaster::{ListenerId, ProgressBroadcaster};
pub use events::{
    expert_progress, CompletionEvent, ExpertStatus, ExpertStatusEvent, ProgressEvent,
    ThinkingEvent, ThinkingStep,
};
