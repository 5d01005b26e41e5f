use std::sync::Arc;

use serde_json::Value;

use super::{render, TypeRule};

/// Accepts only values from a fixed set, compared by JSON equality.
struct OneOfRule {
    allowed: Vec<Value>,
}

impl TypeRule for OneOfRule {
    fn describe(&self) -> String {
        let listed = self
            .allowed
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(", ");
        format!("one of [{listed}]")
    }

    fn check(&self, value: &Value) -> Result<Option<Value>, String> {
        if self.allowed.contains(value) {
            Ok(None)
        } else {
            Err(format!("{} is not {}", render(value), self.describe()))
        }
    }
}

pub fn one_of(allowed: impl IntoIterator<Item = Value>) -> Arc<dyn TypeRule> {
    Arc::new(OneOfRule {
        allowed: allowed.into_iter().collect(),
    })
}
