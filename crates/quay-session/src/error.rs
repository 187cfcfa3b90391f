//! Error types for session lifecycle operations.

/// Failure categories reported by a store's transaction support.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The store has no transaction support.
    #[error("transactions are not supported by this store")]
    NotSupported,

    /// The transaction system itself failed.
    #[error("transaction system failure: {0}")]
    System(String),

    /// The transaction was rolled back instead of committed.
    #[error("transaction rolled back: {0}")]
    RolledBack(String),

    /// A participant decided on its own to roll back.
    #[error("transaction heuristically rolled back: {0}")]
    HeuristicRollback(String),

    /// Some participants committed and others rolled back.
    #[error("transaction partially committed: {0}")]
    HeuristicMixed(String),
}

impl TransactionError {
    /// Whether the store's state can no longer be assumed consistent.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransactionError::System(_) | TransactionError::HeuristicMixed(_)
        )
    }
}

/// Error type for session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The store failed to serve a request.
    #[error("store error: {0}")]
    Store(String),

    /// A session could not cross the store's serialization boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transaction failure.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Registering with or deregistering from a collaborator failed.
    #[error("registration error: {0}")]
    Registration(String),
}

impl SessionError {
    /// Whether this error must reach the caller rather than being logged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Transaction(e) if e.is_fatal())
    }
}

/// Result type for session lifecycle operations.
pub type Result<T> = std::result::Result<T, SessionError>;
