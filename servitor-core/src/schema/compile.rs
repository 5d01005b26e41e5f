use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::PolicyOverrides;
use crate::error::DefinitionError;
use crate::schema::decl::{GuardMode, GuardSource};
use crate::schema::{CompiledService, DeclOp, ServiceSchema, StepDraft};
use crate::types::{FieldSpec, Guard, GuardFn, HookSet, Kind, Position, StepBody, StepSpec};

/// Replays the chain root-to-leaf into the effective view.
pub(crate) fn build(schema: &ServiceSchema) -> Result<CompiledService, DefinitionError> {
    let mut chain: Vec<&ServiceSchema> = Vec::new();
    let mut cursor = Some(schema);
    while let Some(node) = cursor {
        chain.push(node);
        cursor = node.parent().map(|parent| parent.as_ref());
    }
    chain.reverse();

    let mut arguments: IndexMap<String, FieldSpec> = IndexMap::new();
    let mut outputs: IndexMap<String, FieldSpec> = IndexMap::new();
    let mut steps: IndexMap<String, StepDraft> = IndexMap::new();
    let mut handlers: IndexMap<String, StepBody> = IndexMap::new();
    let mut predicates: IndexMap<String, GuardFn> = IndexMap::new();
    let mut hooks = HookSet::default();
    let mut overrides = PolicyOverrides::default();

    for node in &chain {
        for op in node.ops() {
            match op {
                DeclOp::AddArgument(spec) => {
                    arguments.insert(spec.name.clone(), spec.clone());
                }
                DeclOp::AddOutput(spec) => {
                    outputs.insert(spec.name.clone(), spec.clone());
                }
                DeclOp::AddStep(draft) => {
                    place_step(&mut steps, draft, schema.name())?;
                }
                DeclOp::Remove(kind, name) => match kind {
                    Kind::Argument => {
                        arguments.shift_remove(name);
                    }
                    Kind::Output => {
                        outputs.shift_remove(name);
                    }
                    Kind::Step => {
                        steps.shift_remove(name);
                    }
                },
            }
        }
        for (name, body) in node.handlers() {
            handlers.insert(name.clone(), Arc::clone(body));
        }
        for (name, predicate) in node.predicates() {
            predicates.insert(name.clone(), Arc::clone(predicate));
        }
        hooks.extend_from(node.hooks());
        overrides = node.overrides().merged_over(&overrides);
    }

    let mut resolved: IndexMap<String, StepSpec> = IndexMap::with_capacity(steps.len());
    for (name, draft) in steps {
        let body = match draft.body {
            Some(body) => body,
            None => handlers
                .get(&name)
                .map(Arc::clone)
                .ok_or_else(|| DefinitionError::MissingStepBody {
                    service: schema.name().to_string(),
                    name: name.clone(),
                })?,
        };
        let guard = match draft.condition {
            None => None,
            Some((mode, GuardSource::Inline(predicate))) => Some(wrap_guard(mode, predicate)),
            Some((mode, GuardSource::Named(predicate_name))) => {
                let predicate = predicates.get(&predicate_name).map(Arc::clone).ok_or_else(
                    || DefinitionError::UnknownPredicate {
                        service: schema.name().to_string(),
                        name: name.clone(),
                        predicate: predicate_name.clone(),
                    },
                )?;
                Some(wrap_guard(mode, predicate))
            }
        };
        resolved.insert(
            name.clone(),
            StepSpec {
                name,
                body,
                guard,
                always: draft.always,
            },
        );
    }

    Ok(CompiledService::new(
        schema.name().to_string(),
        arguments,
        outputs,
        resolved,
        hooks,
        overrides,
    ))
}

/// Applies one step declaration to the effective order. Redeclaring an
/// existing step keeps its position unless an explicit anchor moves it.
fn place_step(
    steps: &mut IndexMap<String, StepDraft>,
    draft: &StepDraft,
    service: &str,
) -> Result<(), DefinitionError> {
    match &draft.position {
        Position::Append => {
            steps.insert(draft.name.clone(), draft.clone());
        }
        Position::Before(anchor) | Position::After(anchor) => {
            let base = steps.get_index_of(anchor).ok_or_else(|| {
                DefinitionError::UnknownAnchor {
                    service: service.to_string(),
                    name: draft.name.clone(),
                    anchor: anchor.clone(),
                }
            })?;
            let raw = match &draft.position {
                Position::Before(_) => base,
                _ => base + 1,
            };
            // Moving an entry that currently sits before the target shifts
            // the target left by one.
            let target = match steps.get_index_of(&draft.name) {
                Some(current) if current < raw => raw - 1,
                _ => raw,
            };
            steps.shift_insert(target, draft.name.clone(), draft.clone());
        }
    }
    Ok(())
}

fn wrap_guard(mode: GuardMode, predicate: GuardFn) -> Guard {
    match mode {
        GuardMode::If => Guard::If(predicate),
        GuardMode::Unless => Guard::Unless(predicate),
    }
}
