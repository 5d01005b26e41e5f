//! Pluggable type rules applied to argument and output values.
//!
//! A field declares one or more rules; validation runs them in order and
//! the first accepting rule wins. A rule may accept with a replacement
//! value, which is how string-to-number coercion is expressed.

mod coerce;
mod enumerated;
mod nilable;
mod strict;
mod union;

use serde_json::Value;
use thiserror::Error;

use crate::types::Kind;

pub use coerce::{coercible_integer, coercible_number};
pub use enumerated::one_of;
pub use nilable::nilable;
pub use strict::{array, boolean, integer, number, object, string};
pub use union::union;

/// A check applied to a candidate value.
pub trait TypeRule: Send + Sync {
    /// Short description used in mismatch reports, e.g. `string` or
    /// `one of ["pending", "done"]`.
    fn describe(&self) -> String;

    /// `Ok(None)` accepts the value as-is, `Ok(Some(v))` accepts it with a
    /// replacement to store back, `Err(why)` rejects it.
    fn check(&self, value: &Value) -> Result<Option<Value>, String>;
}

/// An argument or output value that no declared rule accepted, or a
/// required one that was absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} '{field}' on service '{service}' expects {expected}, got {found}")]
pub struct TypeMismatch {
    pub service: String,
    pub kind: Kind,
    pub field: String,
    pub expected: String,
    pub found: String,
}

/// JSON kind label used in descriptions and mismatch reports.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Compact rendering of a value for mismatch reports.
pub(crate) fn render(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 64 {
        let head: String = text.chars().take(64).collect();
        format!("{head}...")
    } else {
        text
    }
}
