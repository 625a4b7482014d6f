//! Consultation sessions and their storage
//!
//! A session records every round of a consultation: the user input, the
//! coordinator reply and the expert opinions gathered for it.

pub mod manager;
pub mod store;

pub use manager::{FileSessionStore, InMemorySessionStore, SessionStore};
pub use store::{
    ExpertOutcome, ExpertResult, Round, Session, SessionStatus, SessionSummary, TokenUsage,
};
