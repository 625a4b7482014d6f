//! Expert personas for expert-panel
//!
//! The catalog of consultable experts, the function descriptors offered to
//! the coordinator, and the invoker that runs one expert consultation with
//! retries.

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod invoker;
pub mod opinion;

pub use catalog::{ExpertCatalog, ExpertConfig};
pub use descriptor::FunctionDescriptor;
pub use error::{ExpertUnavailable, UnknownExpertType};
pub use invoker::{ExpertInvoker, PriorOpinion, RetryPolicy};
pub use opinion::ExpertOpinion;
