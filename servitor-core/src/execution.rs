use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::boundary::TransactionBoundary;
use crate::config::RunPolicy;
use crate::messages::{LogKind, MessageLog, MessageRaised};
use crate::schema::CompiledService;
use crate::types::{Control, Kind, StepOutcome};
use crate::values::{FetchError, TypedCollection};

/// Phase of the invocation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Validating,
    Running,
    Stopping,
    Failing,
    Completed,
    Finalizing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Pending => "pending",
            Phase::Validating => "validating",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Failing => "failing",
            Phase::Completed => "completed",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
        };
        f.write_str(label)
    }
}

/// Why the primary step loop halted early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// Graceful stop requested by a step.
    Stopped,
    /// Immediate stop requested by a step.
    StoppedNow,
    /// A step failed gracefully.
    Failed,
    /// A step failed immediately, raised, or crashed.
    FailedNow,
    /// A message log's break flag ended the loop.
    Broke,
}

impl Halt {
    pub fn is_stop(&self) -> bool {
        matches!(self, Halt::Stopped | Halt::StoppedNow)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Halt::Failed | Halt::FailedNow)
    }
}

/// State of one invocation as it moves through the engine.
///
/// Step bodies, guards, and hooks receive this. The reading surface
/// (`arg`, `output`, `success`) and the collecting surface (`fail`,
/// `warn`, `set_output`) are meant for them; the `_mut` accessors and the
/// record/mark methods are the engine's.
pub struct Execution {
    id: Uuid,
    service: Arc<CompiledService>,
    arguments: TypedCollection,
    outputs: TypedCollection,
    errors: MessageLog,
    warnings: MessageLog,
    policy: RunPolicy,
    process_defaults: RunPolicy,
    boundary: Arc<dyn TransactionBoundary>,
    depth: usize,
    phase: Phase,
    halt: Option<Halt>,
    launched: IndexSet<String>,
    skipped: usize,
    cleanup_ran: usize,
    current_step: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(
        service: Arc<CompiledService>,
        arguments: IndexMap<String, Value>,
        policy: RunPolicy,
        process_defaults: RunPolicy,
        boundary: Arc<dyn TransactionBoundary>,
        depth: usize,
    ) -> Self {
        let errors = MessageLog::new(LogKind::Errors, policy.error_add_policy());
        let warnings = MessageLog::new(LogKind::Warnings, policy.warning_add_policy());
        Self {
            id: Uuid::new_v4(),
            arguments: TypedCollection::from_map(Kind::Argument, Arc::clone(&service), arguments),
            outputs: TypedCollection::new(Kind::Output, Arc::clone(&service)),
            service,
            errors,
            warnings,
            policy,
            process_defaults,
            boundary,
            depth,
            phase: Phase::Pending,
            halt: None,
            launched: IndexSet::new(),
            skipped: 0,
            cleanup_ran: 0,
            current_step: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn service(&self) -> &Arc<CompiledService> {
        &self.service
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn arguments(&self) -> &TypedCollection {
        &self.arguments
    }

    pub fn arguments_mut(&mut self) -> &mut TypedCollection {
        &mut self.arguments
    }

    pub fn outputs(&self) -> &TypedCollection {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut TypedCollection {
        &mut self.outputs
    }

    pub fn errors(&self) -> &MessageLog {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut MessageLog {
        &mut self.errors
    }

    pub fn warnings(&self) -> &MessageLog {
        &self.warnings
    }

    pub fn warnings_mut(&mut self) -> &mut MessageLog {
        &mut self.warnings
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    /// Process-defaults snapshot this run resolved its policy from; child
    /// invocations resolve theirs from the same snapshot.
    pub fn process_defaults(&self) -> &RunPolicy {
        &self.process_defaults
    }

    pub fn boundary(&self) -> &Arc<dyn TransactionBoundary> {
        &self.boundary
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn halt(&self) -> Option<Halt> {
        self.halt
    }

    /// Records a halt unless one is already set; the first halt wins.
    pub fn request_halt(&mut self, halt: Halt) {
        if self.halt.is_none() {
            self.halt = Some(halt);
        }
    }

    pub fn launched_steps(&self) -> impl Iterator<Item = &str> {
        self.launched.iter().map(String::as_str)
    }

    pub fn launched(&self, step: &str) -> bool {
        self.launched.contains(step)
    }

    pub fn record_launch(&mut self, step: &str) {
        self.launched.insert(step.to_string());
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanup_ran
    }

    pub fn record_cleanup(&mut self) {
        self.cleanup_ran += 1;
    }

    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    pub fn set_current_step(&mut self, step: Option<String>) {
        self.current_step = step;
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn mark_finished(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// No failure halt and an empty errors log.
    pub fn success(&self) -> bool {
        !self.failure()
    }

    pub fn failure(&self) -> bool {
        self.halt.map(|h| h.is_failure()).unwrap_or(false) || !self.errors.is_empty()
    }

    // Body-facing sugar.

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    pub fn arg_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, FetchError> {
        self.arguments.fetch(name)
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    pub fn output_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, FetchError> {
        self.outputs.fetch(name)
    }

    pub fn set_output(&mut self, name: impl Into<String>, value: Value) {
        self.outputs.set(name, value);
    }

    /// Collects an error message under the run's error policy.
    pub fn fail(
        &mut self,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), MessageRaised> {
        self.errors.add(key, text)
    }

    /// Collects an error message and signals an immediate failure.
    ///
    /// Meant as a step body's tail call: `return ex.fail_now("email",
    /// "already taken");`
    pub fn fail_now(
        &mut self,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> StepOutcome {
        self.fail(key, text)?;
        Ok(Control::FailImmediately)
    }

    /// Collects a warning message under the run's warning policy.
    pub fn warn(
        &mut self,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), MessageRaised> {
        self.warnings.add(key, text)
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("service", &self.service.name())
            .field("phase", &self.phase)
            .field("halt", &self.halt)
            .field("launched", &self.launched)
            .field("errors", &self.errors.len())
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}
