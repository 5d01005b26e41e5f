use std::sync::Arc;

use serde_json::Value;

use super::TypeRule;

/// Accepts `null` or anything the inner rule accepts.
struct NilableRule {
    inner: Arc<dyn TypeRule>,
}

impl TypeRule for NilableRule {
    fn describe(&self) -> String {
        format!("{} | nil", self.inner.describe())
    }

    fn check(&self, value: &Value) -> Result<Option<Value>, String> {
        if value.is_null() {
            return Ok(None);
        }
        self.inner.check(value)
    }
}

pub fn nilable(inner: Arc<dyn TypeRule>) -> Arc<dyn TypeRule> {
    Arc::new(NilableRule { inner })
}
