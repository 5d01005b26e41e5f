use std::fmt;
use std::sync::Arc;

use crate::execution::Execution;
use crate::types::StepError;

/// Hook that observes or mutates the invocation.
pub type SimpleHook = Arc<dyn Fn(&mut Execution) + Send + Sync>;

/// Hook wrapping a body; it decides whether to call `proceed`. Skipping
/// the call skips the wrapped body.
pub type AroundHook =
    Arc<dyn Fn(&mut Execution, &mut dyn FnMut(&mut Execution)) + Send + Sync>;

/// Observer of an unhandled step error before it propagates.
pub type CrashHook = Arc<dyn Fn(&mut Execution, &StepError) + Send + Sync>;

/// Lifecycle points hooks can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeService,
    AroundService,
    AfterService,
    OnServiceSuccess,
    OnServiceFailure,
    BeforeStep,
    AroundStep,
    AfterStep,
    OnStepSuccess,
    OnStepFailure,
    OnStepCrash,
}

impl HookPoint {
    pub const ALL: [HookPoint; 11] = [
        HookPoint::BeforeService,
        HookPoint::AroundService,
        HookPoint::AfterService,
        HookPoint::OnServiceSuccess,
        HookPoint::OnServiceFailure,
        HookPoint::BeforeStep,
        HookPoint::AroundStep,
        HookPoint::AfterStep,
        HookPoint::OnStepSuccess,
        HookPoint::OnStepFailure,
        HookPoint::OnStepCrash,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HookPoint::BeforeService => "before_service",
            HookPoint::AroundService => "around_service",
            HookPoint::AfterService => "after_service",
            HookPoint::OnServiceSuccess => "on_service_success",
            HookPoint::OnServiceFailure => "on_service_failure",
            HookPoint::BeforeStep => "before_step",
            HookPoint::AroundStep => "around_step",
            HookPoint::AfterStep => "after_step",
            HookPoint::OnStepSuccess => "on_step_success",
            HookPoint::OnStepFailure => "on_step_failure",
            HookPoint::OnStepCrash => "on_step_crash",
        }
    }
}

/// A registered hook of whichever shape its point takes.
#[derive(Clone)]
pub enum HookKind {
    Simple(SimpleHook),
    Around(AroundHook),
    Crash(CrashHook),
}

impl fmt::Debug for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Simple(_) => f.write_str("Simple(..)"),
            HookKind::Around(_) => f.write_str("Around(..)"),
            HookKind::Crash(_) => f.write_str("Crash(..)"),
        }
    }
}

/// Hooks in registration order. Compilation concatenates ancestor sets
/// root-first, so iteration order is root-to-leaf and, within one schema,
/// declaration order. For around hooks that makes the first entry the
/// outermost wrapper.
#[derive(Clone, Default)]
pub struct HookSet {
    entries: Vec<(HookPoint, HookKind)>,
}

impl HookSet {
    pub fn push(&mut self, point: HookPoint, hook: HookKind) {
        self.entries.push((point, hook));
    }

    /// Appends every entry of `other`, keeping order.
    pub fn extend_from(&mut self, other: &HookSet) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn at(&self, point: HookPoint) -> impl Iterator<Item = &HookKind> {
        self.entries
            .iter()
            .filter(move |(p, _)| *p == point)
            .map(|(_, hook)| hook)
    }

    pub fn count_at(&self, point: HookPoint) -> usize {
        self.at(point).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}
