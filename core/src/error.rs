use thiserror::Error;

/// Failures of an expense-list operation. Each one has already been surfaced
/// to the user (where applicable) by the time it is returned.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("no signed-in user")]
    Unauthenticated,
    #[error("record has no valid id")]
    MissingIdentifier,
    #[error("failed to {operation}: {source:#}")]
    StoreOperationFailure {
        operation: &'static str,
        source: anyhow::Error,
    },
}

impl ListError {
    pub(crate) fn store(operation: &'static str, source: anyhow::Error) -> Self {
        Self::StoreOperationFailure { operation, source }
    }
}
