use std::sync::Arc;

use serde_json::Value;

use super::{kind_of, TypeRule};

/// Accepts a value any variant accepts; the first match wins and its
/// replacement, if any, is kept.
struct UnionRule {
    variants: Vec<Arc<dyn TypeRule>>,
}

impl TypeRule for UnionRule {
    fn describe(&self) -> String {
        self.variants
            .iter()
            .map(|rule| rule.describe())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn check(&self, value: &Value) -> Result<Option<Value>, String> {
        for rule in &self.variants {
            if let Ok(replacement) = rule.check(value) {
                return Ok(replacement);
            }
        }
        Err(format!(
            "expected {}, got {}",
            self.describe(),
            kind_of(value)
        ))
    }
}

pub fn union(variants: impl IntoIterator<Item = Arc<dyn TypeRule>>) -> Arc<dyn TypeRule> {
    Arc::new(UnionRule {
        variants: variants.into_iter().collect(),
    })
}
