//! Compiled data model of a service: field and step specifications,
//! hooks, and the step control signal.

pub mod control;
pub mod field;
pub mod hooks;
pub mod step;

use std::fmt;

use serde::Serialize;

pub use control::{Control, StepError, StepOutcome};
pub use field::{DefaultFn, FieldDefault, FieldSpec};
pub use hooks::{AroundHook, CrashHook, HookKind, HookPoint, HookSet, SimpleHook};
pub use step::{Guard, GuardFn, Position, StepBody, StepSpec};

/// Declaration kinds a service schema manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Argument,
    Output,
    Step,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Argument => f.write_str("argument"),
            Kind::Output => f.write_str("output"),
            Kind::Step => f.write_str("step"),
        }
    }
}
