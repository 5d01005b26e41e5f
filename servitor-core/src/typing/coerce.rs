use std::sync::Arc;

use serde_json::{Number, Value};

use super::{kind_of, TypeRule};

/// Accepts integers as-is and numeric strings with a parsed replacement.
struct CoercibleInteger;

impl TypeRule for CoercibleInteger {
    fn describe(&self) -> String {
        "integer (coercible from string)".to_string()
    }

    fn check(&self, value: &Value) -> Result<Option<Value>, String> {
        match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(None),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map(|parsed| Some(Value::from(parsed)))
                .map_err(|_| format!("'{text}' does not parse as an integer")),
            other => Err(format!("expected integer or string, got {}", kind_of(other))),
        }
    }
}

/// Accepts any number as-is and numeric strings with a parsed replacement.
struct CoercibleNumber;

impl TypeRule for CoercibleNumber {
    fn describe(&self) -> String {
        "number (coercible from string)".to_string()
    }

    fn check(&self, value: &Value) -> Result<Option<Value>, String> {
        match value {
            Value::Number(_) => Ok(None),
            Value::String(text) => {
                let parsed = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("'{text}' does not parse as a number"))?;
                let number = Number::from_f64(parsed)
                    .ok_or_else(|| format!("'{text}' is not a finite number"))?;
                Ok(Some(Value::Number(number)))
            }
            other => Err(format!("expected number or string, got {}", kind_of(other))),
        }
    }
}

pub fn coercible_integer() -> Arc<dyn TypeRule> {
    Arc::new(CoercibleInteger)
}

pub fn coercible_number() -> Arc<dyn TypeRule> {
    Arc::new(CoercibleNumber)
}
