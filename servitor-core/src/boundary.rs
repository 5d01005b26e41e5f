use thiserror::Error;

/// Failure from the transaction collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction boundary failed during {operation}: {detail}")]
pub struct TransactionError {
    pub operation: String,
    pub detail: String,
}

impl TransactionError {
    pub fn new(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

/// Scopes an invocation's side effects.
///
/// `depth` 0 is the outermost scope; deeper values are nested or
/// savepoint scopes requested by child invocations sharing this handle.
/// Implementations use interior mutability; one handle is shared across
/// an invocation tree behind an `Arc`.
pub trait TransactionBoundary: Send + Sync {
    fn begin(&self, depth: usize) -> Result<(), TransactionError>;
    fn commit(&self, depth: usize) -> Result<(), TransactionError>;
    fn rollback(&self, depth: usize) -> Result<(), TransactionError>;
}

/// Default boundary that scopes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransaction;

impl TransactionBoundary for NoopTransaction {
    fn begin(&self, _depth: usize) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&self, _depth: usize) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(&self, _depth: usize) -> Result<(), TransactionError> {
        Ok(())
    }
}
