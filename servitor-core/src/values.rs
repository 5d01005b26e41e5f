use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::schema::CompiledService;
use crate::types::{FieldSpec, Kind};
use crate::typing::{kind_of, render, TypeMismatch};

static NO_SPECS: LazyLock<IndexMap<String, FieldSpec>> = LazyLock::new(IndexMap::new);

/// Typed read of a value that was absent or of an incompatible shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{kind} '{name}' is not set")]
    Missing { kind: Kind, name: String },
    #[error("{kind} '{name}' does not deserialize to the requested type: {detail}")]
    Incompatible {
        kind: Kind,
        name: String,
        detail: String,
    },
}

/// Ordered name-to-value map backed by the compiled field specs of one
/// kind.
///
/// Undeclared keys are stored verbatim and never validated; validation
/// iterates the declared specs only.
#[derive(Clone)]
pub struct TypedCollection {
    kind: Kind,
    service: Arc<CompiledService>,
    values: IndexMap<String, Value>,
}

impl TypedCollection {
    pub fn new(kind: Kind, service: Arc<CompiledService>) -> Self {
        Self::from_map(kind, service, IndexMap::new())
    }

    pub fn from_map(
        kind: Kind,
        service: Arc<CompiledService>,
        values: IndexMap<String, Value>,
    ) -> Self {
        Self {
            kind,
            service,
            values,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    fn specs(&self) -> &IndexMap<String, FieldSpec> {
        match self.kind {
            Kind::Argument => self.service.arguments(),
            Kind::Output => self.service.outputs(),
            Kind::Step => &NO_SPECS,
        }
    }

    /// Stores the declared default of every spec that has one and no
    /// stored value yet.
    pub fn load_defaults(&mut self) {
        let service = Arc::clone(&self.service);
        for spec in Self::specs_of(&service, self.kind).values() {
            if self.values.contains_key(&spec.name) {
                continue;
            }
            if let Some(default) = &spec.default {
                self.values.insert(spec.name.clone(), default.produce());
            }
        }
    }

    /// Checks every declared spec in order and stores coercion
    /// replacements back. Returns the first mismatch.
    pub fn validate(&mut self) -> Result<(), TypeMismatch> {
        let service = Arc::clone(&self.service);
        for spec in Self::specs_of(&service, self.kind).values() {
            let stored = self.values.get(&spec.name).cloned();
            let value = match stored {
                None => {
                    if spec.optional {
                        continue;
                    }
                    return Err(self.mismatch(spec, "nothing".to_string()));
                }
                Some(Value::Null) if spec.optional => continue,
                Some(value) => value,
            };
            if spec.untyped || spec.rules.is_empty() {
                continue;
            }
            let mut accepted = false;
            for rule in &spec.rules {
                match rule.check(&value) {
                    Ok(None) => {
                        accepted = true;
                        break;
                    }
                    Ok(Some(replacement)) => {
                        self.values.insert(spec.name.clone(), replacement);
                        accepted = true;
                        break;
                    }
                    Err(_) => continue,
                }
            }
            if !accepted {
                let found = format!("{} ({})", kind_of(&value), render(&value));
                return Err(self.mismatch(spec, found));
            }
        }
        Ok(())
    }

    /// Copies every contextual value into `target` unless the key is
    /// already there. Meaningful for argument collections.
    pub fn extend_with_context(&self, target: &mut IndexMap<String, Value>) {
        for spec in self.specs().values() {
            if !spec.contextual {
                continue;
            }
            if target.contains_key(&spec.name) {
                continue;
            }
            if let Some(value) = self.values.get(&spec.name) {
                target.insert(spec.name.clone(), value.clone());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Deserializes the stored value into `T`.
    pub fn fetch<T: DeserializeOwned>(&self, name: &str) -> Result<T, FetchError> {
        let value = self.values.get(name).ok_or_else(|| FetchError::Missing {
            kind: self.kind,
            name: name.to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|source| FetchError::Incompatible {
            kind: self.kind,
            name: name.to_string(),
            detail: source.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.values.clone()
    }

    pub fn into_map(self) -> IndexMap<String, Value> {
        self.values
    }

    fn specs_of(service: &CompiledService, kind: Kind) -> &IndexMap<String, FieldSpec> {
        match kind {
            Kind::Argument => service.arguments(),
            Kind::Output => service.outputs(),
            Kind::Step => &NO_SPECS,
        }
    }

    fn mismatch(&self, spec: &FieldSpec, found: String) -> TypeMismatch {
        TypeMismatch {
            service: self.service.name().to_string(),
            kind: self.kind,
            field: spec.name.clone(),
            expected: spec.type_summary(),
            found,
        }
    }
}

impl fmt::Debug for TypedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCollection")
            .field("kind", &self.kind)
            .field("service", &self.service.name())
            .field("values", &self.values)
            .finish()
    }
}
