//! Dispatch pipeline: confirmation sends and dead-letter replay.

pub mod confirmation;
pub mod dlq;

pub use confirmation::{ConfirmationDispatcher, DispatchOutcome};
pub use dlq::{DlqReplayer, ReplayReport};
