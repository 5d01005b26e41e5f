use thiserror::Error;

use crate::types::Kind;

/// Failure raised while declaring or compiling a service schema.
///
/// Declarations are validated as they are registered, so most variants
/// surface at the call that introduced the bad declaration. Variants that
/// depend on the whole chain (handler and predicate resolution) surface
/// from [`crate::schema::ServiceSchema::compile`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("invalid {kind} name '{name}' on service '{service}': names match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidName {
        service: String,
        kind: Kind,
        name: String,
    },
    #[error("'{name}' is reserved and cannot be declared as {kind} on service '{service}'")]
    ReservedName {
        service: String,
        kind: Kind,
        name: String,
    },
    #[error("'{name}' is already declared as {existing} on service '{service}' and cannot be redeclared as {kind}")]
    CrossKindCollision {
        service: String,
        kind: Kind,
        existing: Kind,
        name: String,
    },
    #[error("{kind} '{name}' on service '{service}' must declare at least one type rule")]
    MissingType {
        service: String,
        kind: Kind,
        name: String,
    },
    #[error("only arguments can be contextual: '{name}' on service '{service}'")]
    ContextualOutput { service: String, name: String },
    #[error("step '{name}' on service '{service}' anchors to unknown step '{anchor}'")]
    UnknownAnchor {
        service: String,
        name: String,
        anchor: String,
    },
    #[error("step '{name}' on service '{service}' declares both an if and an unless condition")]
    ConflictingGuards { service: String, name: String },
    #[error("step '{name}' on service '{service}' has no inline body and no registered handler")]
    MissingStepBody { service: String, name: String },
    #[error("step '{name}' on service '{service}' references unknown predicate '{predicate}'")]
    UnknownPredicate {
        service: String,
        name: String,
        predicate: String,
    },
    #[error("cannot remove {kind} '{name}' from service '{service}': nothing with that name is declared")]
    UnknownRemoval {
        service: String,
        kind: Kind,
        name: String,
    },
}
