use std::sync::Arc;

use serde_json::Value;

use super::{kind_of, TypeRule};

/// Accepts exactly one JSON kind. `number` also accepts integers.
struct KindRule {
    expect: &'static str,
}

impl TypeRule for KindRule {
    fn describe(&self) -> String {
        self.expect.to_string()
    }

    fn check(&self, value: &Value) -> Result<Option<Value>, String> {
        let actual = kind_of(value);
        let matched = match self.expect {
            "number" => matches!(value, Value::Number(_)),
            expect => actual == expect,
        };
        if matched {
            Ok(None)
        } else {
            Err(format!("expected {}, got {}", self.expect, actual))
        }
    }
}

fn kind_rule(expect: &'static str) -> Arc<dyn TypeRule> {
    Arc::new(KindRule { expect })
}

pub fn string() -> Arc<dyn TypeRule> {
    kind_rule("string")
}

pub fn integer() -> Arc<dyn TypeRule> {
    kind_rule("integer")
}

pub fn number() -> Arc<dyn TypeRule> {
    kind_rule("number")
}

pub fn boolean() -> Arc<dyn TypeRule> {
    kind_rule("boolean")
}

pub fn object() -> Arc<dyn TypeRule> {
    kind_rule("object")
}

pub fn array() -> Arc<dyn TypeRule> {
    kind_rule("array")
}
