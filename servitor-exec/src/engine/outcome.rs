use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use servitor_core::execution::{Execution, Halt};
use servitor_core::values::FetchError;

/// How a run settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettledState {
    /// Every launched step returned and no error was collected.
    Completed,
    /// A step requested a stop; not a failure.
    Stopped,
    /// A failure halt, a break, or a collected error.
    Failed,
}

/// Step counters of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepStats {
    pub launched: usize,
    pub skipped: usize,
    pub cleanup: usize,
}

/// A settled invocation.
///
/// Wraps the final [`Execution`] with the settled state and a reading
/// surface over its outputs and logs.
#[derive(Debug)]
pub struct RunOutcome {
    execution: Execution,
    state: SettledState,
}

impl RunOutcome {
    pub(crate) fn new(execution: Execution, state: SettledState) -> Self {
        Self { execution, state }
    }

    pub fn state(&self) -> SettledState {
        self.state
    }

    pub fn success(&self) -> bool {
        self.state != SettledState::Failed
    }

    pub fn failure(&self) -> bool {
        !self.success()
    }

    pub fn id(&self) -> Uuid {
        self.execution.id()
    }

    pub fn service_name(&self) -> &str {
        self.execution.service_name()
    }

    pub fn halt(&self) -> Option<Halt> {
        self.execution.halt()
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.execution.output(name)
    }

    pub fn output_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, FetchError> {
        self.execution.output_as(name)
    }

    pub fn outputs(&self) -> IndexMap<String, Value> {
        self.execution.outputs().to_map()
    }

    pub fn errors(&self) -> IndexMap<String, Vec<String>> {
        self.execution.errors().summary()
    }

    pub fn warnings(&self) -> IndexMap<String, Vec<String>> {
        self.execution.warnings().summary()
    }

    pub fn launched_steps(&self) -> Vec<String> {
        self.execution
            .launched_steps()
            .map(str::to_string)
            .collect()
    }

    pub fn stats(&self) -> StepStats {
        StepStats {
            launched: self.execution.launched_steps().count(),
            skipped: self.execution.skipped_count(),
            cleanup: self.execution.cleanup_count(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.execution.started_at()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.execution.finished_at()
    }

    pub fn duration(&self) -> Duration {
        let end = self.execution.finished_at().unwrap_or_else(Utc::now);
        end - self.execution.started_at()
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn into_execution(self) -> Execution {
        self.execution
    }
}
