use std::sync::Arc;

use serde_json::Value;

use crate::execution::Execution;
use crate::types::{FieldDefault, GuardFn, Position, StepBody, StepOutcome};
use crate::typing::TypeRule;

/// Builder for one argument or output declaration.
///
/// Fields are required and typed by default; `optional`, `untyped`, and
/// defaults loosen that per field.
#[derive(Clone)]
pub struct FieldDecl {
    pub(crate) name: String,
    pub(crate) rules: Vec<Arc<dyn TypeRule>>,
    pub(crate) optional: bool,
    pub(crate) default: Option<FieldDefault>,
    pub(crate) contextual: bool,
    pub(crate) untyped: bool,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            optional: false,
            default: None,
            contextual: false,
            untyped: false,
        }
    }

    /// Adds a type rule; rules run in declaration order, first match wins.
    pub fn typed(mut self, rule: Arc<dyn TypeRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// The field may be absent at validation time.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Stored when no value is present at load time.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(FieldDefault::Static(value));
        self
    }

    /// As `default_value`, computed per invocation.
    pub fn default_with(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(FieldDefault::Generated(Arc::new(factory)));
        self
    }

    /// Arguments only: the value flows into child invocations unasked.
    pub fn contextual(mut self) -> Self {
        self.contextual = true;
        self
    }

    /// Exempts the field from the typed-field requirement.
    pub fn untyped(mut self) -> Self {
        self.untyped = true;
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuardMode {
    If,
    Unless,
}

#[derive(Clone)]
pub(crate) enum GuardSource {
    Inline(GuardFn),
    Named(String),
}

/// Builder for one step declaration.
///
/// A step without an inline body resolves its callable from the handler
/// table under the step's own name at compile time.
#[derive(Clone)]
pub struct StepDecl {
    pub(crate) name: String,
    pub(crate) body: Option<StepBody>,
    pub(crate) condition: Option<(GuardMode, GuardSource)>,
    pub(crate) conflicting: bool,
    pub(crate) always: bool,
    pub(crate) position: Position,
}

impl StepDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: None,
            condition: None,
            conflicting: false,
            always: false,
            position: Position::Append,
        }
    }

    /// Inline step body, taking precedence over a registered handler.
    pub fn body(
        mut self,
        body: impl Fn(&mut Execution) -> StepOutcome + Send + Sync + 'static,
    ) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    /// Launch only when the predicate holds.
    pub fn only_if(mut self, predicate: impl Fn(&Execution) -> bool + Send + Sync + 'static) -> Self {
        self.set_condition(GuardMode::If, GuardSource::Inline(Arc::new(predicate)));
        self
    }

    /// As `only_if`, resolving a predicate registered by name.
    pub fn only_if_named(mut self, predicate: impl Into<String>) -> Self {
        self.set_condition(GuardMode::If, GuardSource::Named(predicate.into()));
        self
    }

    /// Launch only when the predicate does not hold.
    pub fn unless(mut self, predicate: impl Fn(&Execution) -> bool + Send + Sync + 'static) -> Self {
        self.set_condition(GuardMode::Unless, GuardSource::Inline(Arc::new(predicate)));
        self
    }

    /// As `unless`, resolving a predicate registered by name.
    pub fn unless_named(mut self, predicate: impl Into<String>) -> Self {
        self.set_condition(GuardMode::Unless, GuardSource::Named(predicate.into()));
        self
    }

    /// Run during cleanup even after a failure halt.
    pub fn always(mut self) -> Self {
        self.always = true;
        self
    }

    /// Splice before the named sibling instead of appending.
    pub fn before(mut self, anchor: impl Into<String>) -> Self {
        self.position = Position::Before(anchor.into());
        self
    }

    /// Splice after the named sibling instead of appending.
    pub fn after(mut self, anchor: impl Into<String>) -> Self {
        self.position = Position::After(anchor.into());
        self
    }

    fn set_condition(&mut self, mode: GuardMode, source: GuardSource) {
        match &self.condition {
            Some((existing, _)) if *existing != mode => self.conflicting = true,
            _ => self.condition = Some((mode, source)),
        }
    }
}
