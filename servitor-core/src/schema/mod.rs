//! Service declaration and compilation.
//!
//! A [`ServiceSchema`] records declaration operations in order; nothing
//! is merged until [`ServiceSchema::compile`] replays the parent chain
//! root-to-leaf into a [`CompiledService`]. Each operation is validated
//! when it is registered, against the effective view of everything
//! declared so far.

mod compile;
mod compiled;
mod decl;
mod rules;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use crate::config::PolicyOverrides;
use crate::error::DefinitionError;
use crate::execution::Execution;
use crate::types::{
    GuardFn, HookKind, HookPoint, HookSet, Kind, StepBody, StepError, StepOutcome,
};

pub use compiled::{CallbackReport, CompiledService, FieldReport, ServiceReport, StepReport};
pub use decl::{FieldDecl, StepDecl};

use decl::{GuardMode, GuardSource};

/// One recorded declaration operation.
#[derive(Clone)]
pub(crate) enum DeclOp {
    AddArgument(crate::types::FieldSpec),
    AddOutput(crate::types::FieldSpec),
    AddStep(StepDraft),
    Remove(Kind, String),
}

/// A validated step declaration awaiting compile-time resolution of its
/// body and named predicate.
#[derive(Clone)]
pub(crate) struct StepDraft {
    pub(crate) name: String,
    pub(crate) body: Option<StepBody>,
    pub(crate) condition: Option<(GuardMode, GuardSource)>,
    pub(crate) always: bool,
    pub(crate) position: crate::types::Position,
}

/// Declaring type of one service.
///
/// Chains to an optional parent behind an `Arc`; a child replays the
/// parent's operations before its own and can never mutate them.
pub struct ServiceSchema {
    name: String,
    parent: Option<Arc<ServiceSchema>>,
    ops: Vec<DeclOp>,
    handlers: IndexMap<String, StepBody>,
    predicates: IndexMap<String, GuardFn>,
    hooks: HookSet,
    overrides: PolicyOverrides,
    relaxed_typing: bool,
    compiled: OnceCell<Arc<CompiledService>>,
}

impl ServiceSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            ops: Vec::new(),
            handlers: IndexMap::new(),
            predicates: IndexMap::new(),
            hooks: HookSet::default(),
            overrides: PolicyOverrides::default(),
            relaxed_typing: false,
            compiled: OnceCell::new(),
        }
    }

    /// New schema inheriting the parent's declarations, hooks, handler
    /// and predicate tables, policy, and typing posture.
    pub fn extending(name: impl Into<String>, parent: &Arc<ServiceSchema>) -> Self {
        let mut schema = Self::new(name);
        schema.relaxed_typing = parent.relaxed_typing;
        schema.parent = Some(Arc::clone(parent));
        schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ServiceSchema>> {
        self.parent.as_ref()
    }

    /// Declares an argument. Redeclaring an inherited or earlier name
    /// replaces it in place.
    pub fn argument(&mut self, decl: FieldDecl) -> Result<&mut Self, DefinitionError> {
        self.add_field(Kind::Argument, decl)
    }

    /// Declares an output.
    pub fn output(&mut self, decl: FieldDecl) -> Result<&mut Self, DefinitionError> {
        self.add_field(Kind::Output, decl)
    }

    /// Declares a step. Without an inline body the callable resolves from
    /// the handler table under the step's name at compile time.
    pub fn step(&mut self, decl: StepDecl) -> Result<&mut Self, DefinitionError> {
        rules::check_name(&self.name, Kind::Step, &decl.name)?;
        let view = self.name_view();
        rules::check_collision(&self.name, Kind::Step, &decl.name, &view)?;
        rules::check_step(&self.name, &decl, &view)?;
        self.record(DeclOp::AddStep(StepDraft {
            name: decl.name,
            body: decl.body,
            condition: decl.condition,
            always: decl.always,
            position: decl.position,
        }));
        Ok(self)
    }

    pub fn remove_argument(&mut self, name: &str) -> Result<&mut Self, DefinitionError> {
        self.remove(Kind::Argument, name)
    }

    pub fn remove_output(&mut self, name: &str) -> Result<&mut Self, DefinitionError> {
        self.remove(Kind::Output, name)
    }

    pub fn remove_step(&mut self, name: &str) -> Result<&mut Self, DefinitionError> {
        self.remove(Kind::Step, name)
    }

    /// Registers a named step body. Steps resolve handlers by their own
    /// name; a child registration shadows the parent's.
    pub fn handler(
        &mut self,
        name: impl Into<String>,
        body: impl Fn(&mut Execution) -> StepOutcome + Send + Sync + 'static,
    ) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(body));
        self.invalidate();
        self
    }

    /// Registers a named guard predicate for `only_if_named` and
    /// `unless_named`.
    pub fn predicate(
        &mut self,
        name: impl Into<String>,
        predicate: impl Fn(&Execution) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.predicates.insert(name.into(), Arc::new(predicate));
        self.invalidate();
        self
    }

    /// Class-level policy, merged over any inherited overrides at compile
    /// time; per-field, the nearest ancestor wins.
    pub fn configure(&mut self, overrides: PolicyOverrides) -> &mut Self {
        self.overrides = overrides.merged_over(&self.overrides);
        self.invalidate();
        self
    }

    /// Drops the typed-field requirement for this schema and everything
    /// extending it.
    pub fn relax_typing(&mut self) -> &mut Self {
        self.relaxed_typing = true;
        self.invalidate();
        self
    }

    pub fn before_service(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::BeforeService, hook)
    }

    pub fn around_service(
        &mut self,
        hook: impl Fn(&mut Execution, &mut dyn FnMut(&mut Execution)) + Send + Sync + 'static,
    ) -> &mut Self {
        self.push_around(HookPoint::AroundService, hook)
    }

    pub fn after_service(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::AfterService, hook)
    }

    pub fn on_service_success(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::OnServiceSuccess, hook)
    }

    pub fn on_service_failure(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::OnServiceFailure, hook)
    }

    pub fn before_step(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::BeforeStep, hook)
    }

    pub fn around_step(
        &mut self,
        hook: impl Fn(&mut Execution, &mut dyn FnMut(&mut Execution)) + Send + Sync + 'static,
    ) -> &mut Self {
        self.push_around(HookPoint::AroundStep, hook)
    }

    pub fn after_step(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::AfterStep, hook)
    }

    pub fn on_step_success(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::OnStepSuccess, hook)
    }

    pub fn on_step_failure(&mut self, hook: impl Fn(&mut Execution) + Send + Sync + 'static) -> &mut Self {
        self.push_simple(HookPoint::OnStepFailure, hook)
    }

    pub fn on_step_crash(
        &mut self,
        hook: impl Fn(&mut Execution, &StepError) + Send + Sync + 'static,
    ) -> &mut Self {
        self.hooks
            .push(HookPoint::OnStepCrash, HookKind::Crash(Arc::new(hook)));
        self.invalidate();
        self
    }

    /// Replays the chain into the effective view. Memoized until the next
    /// mutating call; a schema that compiled once keeps compiling to the
    /// same view.
    pub fn compile(&self) -> Result<Arc<CompiledService>, DefinitionError> {
        self.compiled
            .get_or_try_init(|| compile::build(self).map(Arc::new))
            .map(Arc::clone)
    }

    pub(crate) fn ops(&self) -> &[DeclOp] {
        &self.ops
    }

    pub(crate) fn handlers(&self) -> &IndexMap<String, StepBody> {
        &self.handlers
    }

    pub(crate) fn predicates(&self) -> &IndexMap<String, GuardFn> {
        &self.predicates
    }

    pub(crate) fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    pub(crate) fn overrides(&self) -> &PolicyOverrides {
        &self.overrides
    }

    fn add_field(&mut self, kind: Kind, decl: FieldDecl) -> Result<&mut Self, DefinitionError> {
        rules::check_name(&self.name, kind, &decl.name)?;
        rules::check_field(&self.name, kind, &decl, self.relaxed_typing)?;
        let view = self.name_view();
        rules::check_collision(&self.name, kind, &decl.name, &view)?;
        let spec = crate::types::FieldSpec {
            name: decl.name,
            rules: decl.rules,
            optional: decl.optional,
            default: decl.default,
            contextual: decl.contextual,
            untyped: decl.untyped,
        };
        self.record(match kind {
            Kind::Argument => DeclOp::AddArgument(spec),
            _ => DeclOp::AddOutput(spec),
        });
        Ok(self)
    }

    fn remove(&mut self, kind: Kind, name: &str) -> Result<&mut Self, DefinitionError> {
        rules::check_removal(&self.name, kind, name, &self.name_view())?;
        self.record(DeclOp::Remove(kind, name.to_string()));
        Ok(self)
    }

    /// Effective name-to-kind view of the chain plus own ops so far.
    fn name_view(&self) -> IndexMap<String, Kind> {
        let mut view = match &self.parent {
            Some(parent) => parent.name_view(),
            None => IndexMap::new(),
        };
        for op in &self.ops {
            match op {
                DeclOp::AddArgument(spec) => {
                    view.insert(spec.name.clone(), Kind::Argument);
                }
                DeclOp::AddOutput(spec) => {
                    view.insert(spec.name.clone(), Kind::Output);
                }
                DeclOp::AddStep(draft) => {
                    view.insert(draft.name.clone(), Kind::Step);
                }
                DeclOp::Remove(_, name) => {
                    view.shift_remove(name);
                }
            }
        }
        view
    }

    fn record(&mut self, op: DeclOp) {
        self.ops.push(op);
        self.invalidate();
    }

    fn push_simple(
        &mut self,
        point: HookPoint,
        hook: impl Fn(&mut Execution) + Send + Sync + 'static,
    ) -> &mut Self {
        self.hooks.push(point, HookKind::Simple(Arc::new(hook)));
        self.invalidate();
        self
    }

    fn push_around(
        &mut self,
        point: HookPoint,
        hook: impl Fn(&mut Execution, &mut dyn FnMut(&mut Execution)) + Send + Sync + 'static,
    ) -> &mut Self {
        self.hooks.push(point, HookKind::Around(Arc::new(hook)));
        self.invalidate();
        self
    }

    fn invalidate(&mut self) {
        self.compiled.take();
    }
}

impl fmt::Debug for ServiceSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSchema")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|parent| parent.name()))
            .finish_non_exhaustive()
    }
}
