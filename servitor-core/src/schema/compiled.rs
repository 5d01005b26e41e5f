use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::PolicyOverrides;
use crate::types::{FieldSpec, HookPoint, HookSet, Kind, StepSpec};

/// Frozen effective view of a service declaration chain.
///
/// Produced by [`crate::schema::ServiceSchema::compile`]; the engine and
/// the collections read from this, never from the schema.
pub struct CompiledService {
    name: String,
    arguments: IndexMap<String, FieldSpec>,
    outputs: IndexMap<String, FieldSpec>,
    steps: IndexMap<String, StepSpec>,
    hooks: HookSet,
    overrides: PolicyOverrides,
}

impl CompiledService {
    pub(crate) fn new(
        name: String,
        arguments: IndexMap<String, FieldSpec>,
        outputs: IndexMap<String, FieldSpec>,
        steps: IndexMap<String, StepSpec>,
        hooks: HookSet,
        overrides: PolicyOverrides,
    ) -> Self {
        Self {
            name,
            arguments,
            outputs,
            steps,
            hooks,
            overrides,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &IndexMap<String, FieldSpec> {
        &self.arguments
    }

    pub fn outputs(&self) -> &IndexMap<String, FieldSpec> {
        &self.outputs
    }

    pub fn steps(&self) -> &IndexMap<String, StepSpec> {
        &self.steps
    }

    pub fn field(&self, kind: Kind, name: &str) -> Option<&FieldSpec> {
        match kind {
            Kind::Argument => self.arguments.get(name),
            Kind::Output => self.outputs.get(name),
            Kind::Step => None,
        }
    }

    /// Steps flagged `always`, in effective order.
    pub fn cleanup_steps(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.values().filter(|step| step.always)
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Class-level policy overrides resolved along the chain.
    pub fn overrides(&self) -> &PolicyOverrides {
        &self.overrides
    }

    /// Serializable summary of the effective view.
    pub fn describe(&self) -> ServiceReport {
        let fields = self
            .arguments
            .values()
            .map(|spec| FieldReport::of(Kind::Argument, spec))
            .chain(
                self.outputs
                    .values()
                    .map(|spec| FieldReport::of(Kind::Output, spec)),
            )
            .collect();
        let steps = self
            .steps
            .values()
            .map(|spec| StepReport {
                name: spec.name.clone(),
                guard: spec.guard.as_ref().map(|guard| guard.mode().to_string()),
                always: spec.always,
            })
            .collect();
        let callbacks = HookPoint::ALL
            .iter()
            .filter_map(|point| {
                let count = self.hooks.count_at(*point);
                (count > 0).then(|| CallbackReport {
                    point: point.label().to_string(),
                    count,
                })
            })
            .collect();
        ServiceReport {
            service: self.name.clone(),
            fields,
            steps,
            callbacks,
        }
    }
}

impl fmt::Debug for CompiledService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledService")
            .field("name", &self.name)
            .field("arguments", &self.arguments.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Introspection summary of one compiled service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub service: String,
    pub fields: Vec<FieldReport>,
    pub steps: Vec<StepReport>,
    pub callbacks: Vec<CallbackReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    pub name: String,
    pub kind: Kind,
    #[serde(rename = "type")]
    pub type_summary: String,
    pub optional: bool,
    pub contextual: bool,
    pub has_default: bool,
}

impl FieldReport {
    fn of(kind: Kind, spec: &FieldSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind,
            type_summary: spec.type_summary(),
            optional: spec.optional,
            contextual: spec.contextual,
            has_default: spec.default.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    pub always: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackReport {
    pub point: String,
    pub count: usize,
}
