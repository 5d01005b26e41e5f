use std::fmt;
use std::sync::Arc;

use crate::execution::Execution;
use crate::types::StepOutcome;

/// Callable a step runs.
pub type StepBody = Arc<dyn Fn(&mut Execution) -> StepOutcome + Send + Sync>;

/// Predicate deciding whether a guarded step launches.
pub type GuardFn = Arc<dyn Fn(&Execution) -> bool + Send + Sync>;

/// Launch condition attached to a step.
#[derive(Clone)]
pub enum Guard {
    If(GuardFn),
    Unless(GuardFn),
}

impl Guard {
    pub fn allows(&self, execution: &Execution) -> bool {
        match self {
            Guard::If(predicate) => predicate(execution),
            Guard::Unless(predicate) => !predicate(execution),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Guard::If(_) => "if",
            Guard::Unless(_) => "unless",
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode())
    }
}

/// Where a step declaration lands in the effective order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Append,
    Before(String),
    After(String),
}

/// Effective declaration of one step.
#[derive(Clone)]
pub struct StepSpec {
    pub name: String,
    pub body: StepBody,
    pub guard: Option<Guard>,
    /// Runs during cleanup even after a failure halt, unless already
    /// launched.
    pub always: bool,
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("guard", &self.guard)
            .field("always", &self.always)
            .finish_non_exhaustive()
    }
}
