use servitor_core::boundary::TransactionError;
use servitor_core::error::DefinitionError;
use servitor_core::messages::MessageRaised;
use servitor_core::types::StepError;
use servitor_core::typing::TypeMismatch;

/// Errors surfaced by a run.
///
/// `Raised` carries a message appended under a raising policy; it is
/// the one variant callers are expected to match on routinely, the
/// rest indicate a broken declaration or a failing step body.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("invalid argument: {0}")]
    ArgumentType(TypeMismatch),

    #[error("invalid output: {0}")]
    OutputType(TypeMismatch),

    #[error(transparent)]
    Raised(#[from] MessageRaised),

    #[error("step '{step}' crashed")]
    StepCrashed {
        step: String,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
