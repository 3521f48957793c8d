//! Error types shared by the registry, sensor clusters and session driver.

use crate::registry::BodyId;

/// Errors raised by structural operations.
///
/// Every variant except `Config` is a programmer error: the tick loop stops
/// and the error is handed to the embedder instead of being swallowed.
#[derive(Debug, thiserror::Error)]
pub enum WarpError {
    #[error("physics world mutated while a step is in progress")]
    StepInProgress,
    #[error("body {0} is already marked for deletion")]
    DoubleDeletion(BodyId),
    #[error("body {0} is not registered")]
    UnknownBody(BodyId),
    #[error("sensor cluster needs at least 2 members, got {members}")]
    InvalidCluster { members: usize },
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}
