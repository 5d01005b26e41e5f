//! The state machine that drives one invocation.
//!
//! Phases: Pending, Validating, Running, one of Stopping/Failing/
//! Completed, Finalizing, Done. Argument and output type failures are
//! hard errors; domain messages collect in the logs and only halt or
//! raise per policy.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use servitor_core::boundary::TransactionBoundary;
use servitor_core::config::RunPolicy;
use servitor_core::execution::{Execution, Halt, Phase};
use servitor_core::messages::MessageRaised;
use servitor_core::schema::CompiledService;
use servitor_core::types::{Control, HookPoint, StepError, StepOutcome, StepSpec};

use crate::engine::dispatch;
use crate::engine::error::EngineError;
use crate::engine::outcome::{RunOutcome, SettledState};

/// How the step phase ended, cleanup included.
enum LoopExit {
    Done,
    Raised(MessageRaised),
    Crashed { step: String, source: StepError },
}

enum StepEnd {
    Ran,
    Raised(MessageRaised),
    Crashed(StepError),
}

pub(crate) fn run(
    service: Arc<CompiledService>,
    arguments: IndexMap<String, Value>,
    policy: RunPolicy,
    process_defaults: RunPolicy,
    boundary: Arc<dyn TransactionBoundary>,
    depth: usize,
    parent: Option<&mut Execution>,
) -> Result<RunOutcome, EngineError> {
    for key in arguments.keys() {
        if !service.arguments().contains_key(key) {
            tracing::warn!(
                service = service.name(),
                argument = %key,
                "Undeclared argument stored without validation"
            );
        }
    }

    let mut execution =
        Execution::new(service, arguments, policy, process_defaults, boundary, depth);
    tracing::debug!(
        service = execution.service_name(),
        id = %execution.id(),
        depth,
        "Invocation starting"
    );

    execution.set_phase(Phase::Validating);
    execution.outputs_mut().load_defaults();
    execution.arguments_mut().load_defaults();
    if let Err(mismatch) = execution.arguments_mut().validate() {
        return Err(EngineError::ArgumentType(mismatch));
    }

    execution.set_phase(Phase::Running);
    dispatch::run_simple(&mut execution, HookPoint::BeforeService);

    let scoped = execution.policy().use_transactions;
    if scoped {
        execution.boundary().begin(depth)?;
    }

    let steps: Vec<StepSpec> = execution.service().steps().values().cloned().collect();
    let mut exit = LoopExit::Done;
    dispatch::run_around(&mut execution, HookPoint::AroundService, &mut |inner| {
        exit = primary_loop(inner, &steps);
    });

    let exit = run_cleanup(&mut execution, exit);

    let failed_exit = !matches!(exit, LoopExit::Done);
    if scoped {
        close_scope(&execution, depth, failed_exit)?;
    }

    match exit {
        LoopExit::Raised(raised) => return Err(EngineError::Raised(raised)),
        LoopExit::Crashed { step, source } => {
            return Err(EngineError::StepCrashed { step, source })
        }
        LoopExit::Done => {}
    }

    if !execution.failure() {
        if let Err(mismatch) = execution.outputs_mut().validate() {
            return Err(EngineError::OutputType(mismatch));
        }
    }

    if let Some(parent) = parent {
        propagate(&execution, parent)?;
    }

    let state = settle(&mut execution);
    execution.set_phase(Phase::Finalizing);
    dispatch::run_simple(&mut execution, HookPoint::AfterService);
    let point = match state {
        SettledState::Failed => HookPoint::OnServiceFailure,
        _ => HookPoint::OnServiceSuccess,
    };
    dispatch::run_simple(&mut execution, point);
    execution.set_phase(Phase::Done);
    execution.mark_finished();
    tracing::debug!(
        service = execution.service_name(),
        id = %execution.id(),
        state = ?state,
        launched = execution.launched_steps().count(),
        skipped = execution.skipped_count(),
        "Invocation settled"
    );
    Ok(RunOutcome::new(execution, state))
}

fn primary_loop(execution: &mut Execution, steps: &[StepSpec]) -> LoopExit {
    for spec in steps {
        match run_step(execution, spec, false) {
            StepEnd::Ran => {}
            StepEnd::Raised(raised) => return LoopExit::Raised(raised),
            StepEnd::Crashed(source) => {
                return LoopExit::Crashed {
                    step: spec.name.clone(),
                    source,
                }
            }
        }
        if execution.halt().is_some() {
            break;
        }
        if execution.errors().broke() || execution.warnings().broke() {
            execution.request_halt(Halt::Broke);
            tracing::debug!(
                service = execution.service_name(),
                after = %spec.name,
                "Break flag ended the step loop"
            );
            break;
        }
    }
    LoopExit::Done
}

/// Runs every not-yet-launched `always` step, honoring guards. Skipped
/// entirely after a stop halt. A failure here never displaces one
/// already in flight from the primary loop.
fn run_cleanup(execution: &mut Execution, primary: LoopExit) -> LoopExit {
    if execution.halt().map(|halt| halt.is_stop()).unwrap_or(false) {
        return primary;
    }
    let pending: Vec<StepSpec> = execution
        .service()
        .cleanup_steps()
        .filter(|spec| !execution.launched(&spec.name))
        .cloned()
        .collect();
    let mut secondary = None;
    for spec in &pending {
        match run_step(execution, spec, true) {
            StepEnd::Ran => {}
            StepEnd::Raised(raised) => {
                secondary = Some(LoopExit::Raised(raised));
                break;
            }
            StepEnd::Crashed(source) => {
                secondary = Some(LoopExit::Crashed {
                    step: spec.name.clone(),
                    source,
                });
                break;
            }
        }
    }
    match (primary, secondary) {
        (LoopExit::Done, Some(from_cleanup)) => from_cleanup,
        (primary, Some(from_cleanup)) => {
            if let LoopExit::Crashed { step, source } = &from_cleanup {
                tracing::error!(
                    service = execution.service_name(),
                    step = %step,
                    error = %source,
                    "Cleanup step failed while another failure was in flight"
                );
            } else if let LoopExit::Raised(raised) = &from_cleanup {
                tracing::error!(
                    service = execution.service_name(),
                    error = %raised,
                    "Cleanup raised while another failure was in flight"
                );
            }
            primary
        }
        (primary, None) => primary,
    }
}

fn run_step(execution: &mut Execution, spec: &StepSpec, cleanup: bool) -> StepEnd {
    if let Some(guard) = &spec.guard {
        if !guard.allows(execution) {
            execution.record_skip();
            tracing::debug!(
                service = execution.service_name(),
                step = %spec.name,
                "Guard skipped step"
            );
            return StepEnd::Ran;
        }
    }

    execution.set_current_step(Some(spec.name.clone()));
    let errors_before = execution.errors().len();
    dispatch::run_simple(execution, HookPoint::BeforeStep);

    let body = Arc::clone(&spec.body);
    let mut result: Option<StepOutcome> = None;
    dispatch::run_around(execution, HookPoint::AroundStep, &mut |inner| {
        result = Some(body(inner));
    });
    execution.record_launch(&spec.name);
    if cleanup {
        execution.record_cleanup();
    }

    // A body suppressed by an around hook counts as a plain completion.
    let end = match result.unwrap_or(Ok(Control::Continue)) {
        Ok(control) => {
            settle_step(execution, control, errors_before, cleanup);
            StepEnd::Ran
        }
        Err(error) => match as_raised(error) {
            Ok(raised) => {
                if !cleanup {
                    execution.request_halt(Halt::FailedNow);
                }
                StepEnd::Raised(raised)
            }
            Err(source) => {
                dispatch::run_crash(execution, &source);
                if !cleanup {
                    execution.request_halt(Halt::FailedNow);
                }
                StepEnd::Crashed(source)
            }
        },
    };
    execution.set_current_step(None);
    end
}

/// Post-step dispatch and halt recording. The immediate variants skip
/// `after_step`; an immediate stop skips the success/failure pair too.
/// Cleanup steps never record a halt.
fn settle_step(execution: &mut Execution, control: Control, errors_before: usize, cleanup: bool) {
    match control {
        Control::Continue | Control::Stop => {
            dispatch::run_simple(execution, HookPoint::AfterStep);
            let point = if execution.errors().len() > errors_before {
                HookPoint::OnStepFailure
            } else {
                HookPoint::OnStepSuccess
            };
            dispatch::run_simple(execution, point);
        }
        Control::Fail => {
            dispatch::run_simple(execution, HookPoint::AfterStep);
            dispatch::run_simple(execution, HookPoint::OnStepFailure);
        }
        Control::FailImmediately => {
            dispatch::run_simple(execution, HookPoint::OnStepFailure);
        }
        Control::StopImmediately => {}
    }

    if cleanup {
        return;
    }
    match control {
        Control::Continue => {}
        Control::Stop => execution.request_halt(Halt::Stopped),
        Control::StopImmediately => execution.request_halt(Halt::StoppedNow),
        Control::Fail => execution.request_halt(Halt::Failed),
        Control::FailImmediately => execution.request_halt(Halt::FailedNow),
    }
}

/// Splits a raised message off from a genuine crash. A raise travels
/// either as a bare [`MessageRaised`] or wrapped by a nested run.
fn as_raised(error: StepError) -> Result<MessageRaised, StepError> {
    let error = match error.downcast::<MessageRaised>() {
        Ok(raised) => return Ok(*raised),
        Err(error) => error,
    };
    match error.downcast::<EngineError>() {
        Ok(engine) => match *engine {
            EngineError::Raised(raised) => Ok(raised),
            other => Err(Box::new(other)),
        },
        Err(error) => Err(error),
    }
}

fn close_scope(execution: &Execution, depth: usize, failed_exit: bool) -> Result<(), EngineError> {
    let rollback = failed_exit
        || execution.errors().rollback_requested()
        || execution.warnings().rollback_requested();
    let closed = if rollback {
        tracing::debug!(
            service = execution.service_name(),
            depth,
            "Rolling back scope"
        );
        execution.boundary().rollback(depth)
    } else {
        execution.boundary().commit(depth)
    };
    match closed {
        Ok(()) => Ok(()),
        Err(error) if failed_exit => {
            tracing::error!(
                service = execution.service_name(),
                error = %error,
                "Scope close failed while a failure was in flight"
            );
            Ok(())
        }
        Err(error) => Err(EngineError::Transaction(error)),
    }
}

/// Copies this run's messages into the parent's logs, under the
/// parent's own add policy.
fn propagate(execution: &Execution, parent: &mut Execution) -> Result<(), MessageRaised> {
    if execution.policy().load_errors {
        parent.errors_mut().absorb(execution.errors())?;
    }
    if execution.policy().load_warnings {
        parent.warnings_mut().absorb(execution.warnings())?;
    }
    Ok(())
}

fn settle(execution: &mut Execution) -> SettledState {
    if execution.failure() {
        execution.set_phase(Phase::Failing);
        SettledState::Failed
    } else if execution.halt().map(|halt| halt.is_stop()).unwrap_or(false) {
        execution.set_phase(Phase::Stopping);
        SettledState::Stopped
    } else {
        execution.set_phase(Phase::Completed);
        SettledState::Completed
    }
}
