use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use servitor_core::boundary::{NoopTransaction, TransactionBoundary};
use servitor_core::config::{PolicyOverrides, RunPolicy};
use servitor_core::error::DefinitionError;
use servitor_core::execution::Execution;
use servitor_core::schema::{CompiledService, ServiceSchema};

use crate::engine::error::EngineError;
use crate::engine::outcome::RunOutcome;
use crate::engine::runner;
use crate::settings::EngineSettings;

/// Conversion into the argument map of a run.
pub trait IntoArguments {
    fn into_arguments(self) -> IndexMap<String, Value>;
}

impl IntoArguments for IndexMap<String, Value> {
    fn into_arguments(self) -> IndexMap<String, Value> {
        self
    }
}

impl IntoArguments for () {
    fn into_arguments(self) -> IndexMap<String, Value> {
        IndexMap::new()
    }
}

/// A JSON object maps key by key and null means no arguments; any other
/// shape is dropped with a warning.
impl IntoArguments for Value {
    fn into_arguments(self) -> IndexMap<String, Value> {
        match self {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => IndexMap::new(),
            other => {
                tracing::warn!(found = %other, "Arguments must be a JSON object; ignoring");
                IndexMap::new()
            }
        }
    }
}

/// One configured call.
///
/// Built by [`Perform::invoker`] or [`Perform::with`]; consumed by
/// [`Invoker::run`]. Resolution order for every policy toggle: process
/// defaults, then class overrides, then [`Invoker::configured`].
pub struct Invoker<'p> {
    service: Arc<CompiledService>,
    parent: Option<&'p mut Execution>,
    overrides: PolicyOverrides,
    settings: Option<EngineSettings>,
    boundary: Option<Arc<dyn TransactionBoundary>>,
}

impl<'p> Invoker<'p> {
    pub fn new(service: Arc<CompiledService>) -> Self {
        Self {
            service,
            parent: None,
            overrides: PolicyOverrides::default(),
            settings: None,
            boundary: None,
        }
    }

    /// Threads `parent` through: its context-flagged arguments extend
    /// the call's, its scope and process defaults carry over, and the
    /// child's messages load back into it per policy.
    pub fn parent<'q>(self, parent: &'q mut Execution) -> Invoker<'q> {
        Invoker {
            service: self.service,
            parent: Some(parent),
            overrides: self.overrides,
            settings: self.settings,
            boundary: self.boundary,
        }
    }

    /// Per-call overrides, the top layer of the resolution chain. Set
    /// fields of a later call shadow those of an earlier one.
    pub fn configured(mut self, overrides: PolicyOverrides) -> Self {
        self.overrides = overrides.merged_over(&self.overrides);
        self
    }

    /// Process settings this call resolves its defaults from. A parented
    /// call ignores this and inherits the parent's snapshot.
    pub fn settings(mut self, settings: &EngineSettings) -> Self {
        self.settings = Some(settings.clone());
        self
    }

    /// Transaction collaborator scoping this call. A parented call
    /// ignores this and shares the parent's scope one level deeper.
    pub fn boundary(mut self, boundary: Arc<dyn TransactionBoundary>) -> Self {
        self.boundary = Some(boundary);
        self
    }

    pub fn run(self, args: impl IntoArguments) -> Result<RunOutcome, EngineError> {
        let mut map = args.into_arguments();

        let process = match &self.parent {
            Some(parent) => *parent.process_defaults(),
            None => match &self.settings {
                Some(settings) => settings.snapshot(),
                None => RunPolicy::default(),
            },
        };
        let policy = process
            .layered(self.service.overrides())
            .layered(&self.overrides);

        let (boundary, depth) = match &self.parent {
            Some(parent) => (Arc::clone(parent.boundary()), parent.depth() + 1),
            None => (
                self.boundary
                    .clone()
                    .unwrap_or_else(|| Arc::new(NoopTransaction)),
                0,
            ),
        };

        if let Some(parent) = &self.parent {
            parent.arguments().extend_with_context(&mut map);
        }

        runner::run(
            self.service,
            map,
            policy,
            process,
            boundary,
            depth,
            self.parent,
        )
    }

    /// Same call with raise-on-error forced on: a collected error
    /// surfaces as [`EngineError::Raised`] instead of a failed outcome.
    pub fn run_strict(mut self, args: impl IntoArguments) -> Result<RunOutcome, EngineError> {
        self.overrides.raise_on_error = Some(true);
        self.run(args)
    }
}

/// Calling surface over anything that yields a compiled service.
///
/// Implemented for [`ServiceSchema`] and for `Arc<CompiledService>`, so
/// a schema can be run directly or compiled once and run many times.
pub trait Perform {
    fn compiled(&self) -> Result<Arc<CompiledService>, DefinitionError>;

    fn invoker(&self) -> Result<Invoker<'static>, EngineError> {
        Ok(Invoker::new(self.compiled()?))
    }

    /// Runs with default configuration. A collected-message failure
    /// settles into the outcome; only raises, crashes, and hard errors
    /// come back as `Err`.
    fn run(&self, args: impl IntoArguments) -> Result<RunOutcome, EngineError> {
        self.invoker()?.run(args)
    }

    /// Runs with raise-on-error forced on.
    fn run_strict(&self, args: impl IntoArguments) -> Result<RunOutcome, EngineError> {
        self.invoker()?.run_strict(args)
    }

    /// Invoker threading `parent` through for context and propagation.
    fn with<'p>(&self, parent: &'p mut Execution) -> Result<Invoker<'p>, EngineError> {
        Ok(self.invoker()?.parent(parent))
    }
}

impl Perform for ServiceSchema {
    fn compiled(&self) -> Result<Arc<CompiledService>, DefinitionError> {
        self.compile()
    }
}

impl Perform for Arc<CompiledService> {
    fn compiled(&self) -> Result<Arc<CompiledService>, DefinitionError> {
        Ok(Arc::clone(self))
    }
}
