//! Expert lookup and invocation errors

use expert_panel_providers::InvocationErrorKind;
use thiserror::Error;

/// Lookup of an expert identifier that is not in the catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown expert type: {0}")]
pub struct UnknownExpertType(pub String);

/// An expert could not produce an opinion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{expert_name} unavailable after {attempts} attempt(s) ({kind}): {message}")]
pub struct ExpertUnavailable {
    pub expert_type: String,
    pub expert_name: String,
    pub kind: InvocationErrorKind,
    pub message: String,
    /// Model calls made before giving up; zero when the expert was never found
    pub attempts: u32,
}

impl From<UnknownExpertType> for ExpertUnavailable {
    fn from(err: UnknownExpertType) -> Self {
        Self {
            expert_name: err.0.clone(),
            message: err.to_string(),
            expert_type: err.0,
            kind: InvocationErrorKind::Unknown,
            attempts: 0,
        }
    }
}

impl ExpertUnavailable {
    /// System notice recorded in place of the expert's opinion
    pub fn notice(&self) -> String {
        format!(
            "[System notice] {} is temporarily unavailable ({}): {}. Please try again later or contact support.",
            self.expert_name, self.kind, self.message
        )
    }
}
