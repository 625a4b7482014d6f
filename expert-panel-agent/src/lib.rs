//! Consultation engine for expert-panel
//!
//! Drives multi-round consultations: the coordinator model picks experts
//! through function calls, the dispatcher consults them, and the manager
//! records each round on the session.

pub mod completion;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod manager;

#[cfg(test)]
mod testing;

pub use completion::{CompletionDetector, KeywordCompletionDetector};
pub use context::ContextBuilder;
pub use dispatcher::ToolDispatcher;
pub use error::{ConsultationError, ConsultationResult};
pub use manager::{
    ConsultationManager, ConsultationManagerBuilder, RoundOutcome, StartOutcome,
    ROUND_LIMIT_NOTICE,
};
