#![forbid(unsafe_code)]

pub mod boundary;
pub mod config;
pub mod error;
pub mod execution;
pub mod messages;
pub mod schema;
pub mod types;
pub mod typing;
pub mod values;

pub use crate::boundary::{NoopTransaction, TransactionBoundary, TransactionError};
pub use crate::config::{PolicyOverrides, RunPolicy};
pub use crate::error::DefinitionError;
pub use crate::execution::{Execution, Halt, Phase};
pub use crate::messages::{
    AddOptions, AddPolicy, IntoMessages, LogKind, Message, MessageLog, MessageRaised,
};
pub use crate::schema::{
    CallbackReport, CompiledService, FieldDecl, FieldReport, ServiceReport, ServiceSchema,
    StepDecl, StepReport,
};
pub use crate::types::{
    Control, FieldDefault, FieldSpec, Guard, HookKind, HookPoint, Kind, StepError, StepOutcome,
    StepSpec,
};
pub use crate::typing::{TypeMismatch, TypeRule};
pub use crate::values::{FetchError, TypedCollection};
