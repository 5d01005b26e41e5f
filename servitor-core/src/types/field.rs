use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::typing::TypeRule;

/// Factory for a default computed at load time.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Default stored when a field has no value at validation time.
#[derive(Clone)]
pub enum FieldDefault {
    Static(Value),
    Generated(DefaultFn),
}

impl FieldDefault {
    pub fn produce(&self) -> Value {
        match self {
            FieldDefault::Static(value) => value.clone(),
            FieldDefault::Generated(factory) => factory(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Static(value) => f.debug_tuple("Static").field(value).finish(),
            FieldDefault::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// Effective declaration of one argument or output.
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub rules: Vec<Arc<dyn TypeRule>>,
    pub optional: bool,
    pub default: Option<FieldDefault>,
    /// Arguments only: the value flows into child invocations unasked.
    pub contextual: bool,
    /// Exempt from the typed-field requirement and never validated.
    pub untyped: bool,
}

impl FieldSpec {
    /// Joined description of the declared rules, `any` when untyped.
    pub fn type_summary(&self) -> String {
        if self.rules.is_empty() {
            return "any".to_string();
        }
        self.rules
            .iter()
            .map(|rule| rule.describe())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("type", &self.type_summary())
            .field("optional", &self.optional)
            .field("default", &self.default)
            .field("contextual", &self.contextual)
            .finish_non_exhaustive()
    }
}
