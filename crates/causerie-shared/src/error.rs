use thiserror::Error;

#[derive(Error, Debug)]
pub enum CauserieError {
    #[error("Descriptor source error: {0}")]
    Source(#[from] SourceError),

    #[error("Conversation task is no longer running")]
    Closed,
}

/// Failures reported by the descriptor collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Descriptor source unavailable: {0}")]
    Unavailable(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Conversation not found")]
    UnknownConversation,
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CauserieError>;
