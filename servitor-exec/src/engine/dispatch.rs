//! Hook dispatch.
//!
//! Simple hooks run in registration order. Around hooks compose into a
//! continuation chain with the first-registered hook outermost and the
//! caller-supplied body innermost; a hook that never calls its
//! continuation suppresses everything inside it.

use std::sync::Arc;

use servitor_core::execution::Execution;
use servitor_core::types::{AroundHook, HookKind, HookPoint, StepError};

pub(crate) fn run_simple(execution: &mut Execution, point: HookPoint) {
    let service = Arc::clone(execution.service());
    for hook in service.hooks().at(point) {
        if let HookKind::Simple(hook) = hook {
            hook(execution);
        }
    }
}

pub(crate) fn run_crash(execution: &mut Execution, error: &StepError) {
    let service = Arc::clone(execution.service());
    for hook in service.hooks().at(HookPoint::OnStepCrash) {
        if let HookKind::Crash(hook) = hook {
            hook(execution, error);
        }
    }
}

pub(crate) fn run_around(
    execution: &mut Execution,
    point: HookPoint,
    body: &mut dyn FnMut(&mut Execution),
) {
    let service = Arc::clone(execution.service());
    let wrappers: Vec<AroundHook> = service
        .hooks()
        .at(point)
        .filter_map(|hook| match hook {
            HookKind::Around(hook) => Some(Arc::clone(hook)),
            _ => None,
        })
        .collect();
    nest(&wrappers, execution, body);
}

fn nest(
    wrappers: &[AroundHook],
    execution: &mut Execution,
    body: &mut dyn FnMut(&mut Execution),
) {
    match wrappers.split_first() {
        Some((outer, rest)) => outer(execution, &mut |inner| nest(rest, inner, &mut *body)),
        None => body(execution),
    }
}
