use alloc::boxed::Box;
use alloc::string::String;

use thiserror::Error;

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors surfaced by tree operations.
///
/// Missing keys are never errors; every lookup-style operation reports
/// absence as `None`. Errors signal misuse ([`PreconditionViolation`]) or
/// internal corruption ([`InvariantBroken`]); a tree that has reported the
/// latter must not be used further.
///
/// [`PreconditionViolation`]: TreeError::PreconditionViolation
/// [`InvariantBroken`]: TreeError::InvariantBroken
#[derive(Debug, Error)]
pub enum TreeError {
    /// An argument violated a documented requirement.
    #[error("precondition violated: {0}")]
    PreconditionViolation(&'static str),

    /// The tree reached a state its invariants rule out.
    #[error("tree invariant broken: {0}")]
    InvariantBroken(String),

    /// A rebalancing pass failed; the cause is chained as the source.
    #[error("failed while balancing")]
    Balance(#[source] Box<TreeError>),
}

impl TreeError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantBroken(message.into())
    }

    pub(crate) fn balancing(cause: TreeError) -> Self {
        Self::Balance(Box::new(cause))
    }
}
