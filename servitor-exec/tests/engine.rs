use std::sync::{Arc, Mutex};

use serde_json::json;
use servitor_core::config::PolicyOverrides;
use servitor_core::execution::{Halt, Phase};
use servitor_core::messages::LogKind;
use servitor_core::schema::{FieldDecl, ServiceSchema, StepDecl};
use servitor_core::types::Control;
use servitor_core::typing;
use servitor_exec::{EngineError, Perform, SettledState};

type Trace = Arc<Mutex<Vec<String>>>;

fn make_trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(trace: &Trace, label: &str) {
    trace.lock().unwrap().push(label.to_string());
}

fn recorded(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}

#[test]
fn a_plain_run_completes_and_reports_outputs() {
    let mut schema = ServiceSchema::new("greet");
    schema
        .argument(FieldDecl::new("name").typed(typing::string()))
        .unwrap()
        .output(FieldDecl::new("message").typed(typing::string()))
        .unwrap()
        .step(StepDecl::new("compose").body(|ex| {
            let name: String = ex.arg_as("name")?;
            ex.set_output("message", json!(format!("hello {name}")));
            Ok(Control::Continue)
        }))
        .unwrap();

    let outcome = schema.run(json!({"name": "kim"})).unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.state(), SettledState::Completed);
    assert_eq!(outcome.service_name(), "greet");
    assert_eq!(outcome.output("message"), Some(&json!("hello kim")));
    let message: String = outcome.output_as("message").unwrap();
    assert_eq!(message, "hello kim");
    assert_eq!(outcome.halt(), None);
    assert_eq!(outcome.launched_steps(), ["compose"]);
    let stats = outcome.stats();
    assert_eq!(stats.launched, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.cleanup, 0);
    assert!(outcome.errors().is_empty());
    assert!(outcome.finished_at().is_some());
    assert_eq!(outcome.execution().phase(), Phase::Done);
}

#[test]
fn declared_coercions_rewrite_arguments_before_the_run() {
    let mut schema = ServiceSchema::new("age_check");
    schema
        .argument(FieldDecl::new("age").typed(typing::coercible_integer()))
        .unwrap()
        .output(FieldDecl::new("doubled").typed(typing::integer()))
        .unwrap()
        .step(StepDecl::new("double").body(|ex| {
            let age: i64 = ex.arg_as("age")?;
            ex.set_output("doubled", json!(age * 2));
            Ok(Control::Continue)
        }))
        .unwrap();

    let outcome = schema.run(json!({"age": "25"})).unwrap();
    assert_eq!(outcome.output("doubled"), Some(&json!(50)));
    assert_eq!(outcome.execution().arg("age"), Some(&json!(25)));
}

#[test]
fn an_unparseable_argument_is_a_hard_error() {
    let mut schema = ServiceSchema::new("age_check");
    schema
        .argument(FieldDecl::new("age").typed(typing::integer()))
        .unwrap()
        .step(StepDecl::new("noop").body(|_ex| Ok(Control::Continue)))
        .unwrap();

    match schema.run(json!({"age": "25"})) {
        Err(EngineError::ArgumentType(mismatch)) => {
            assert_eq!(mismatch.field, "age");
            assert_eq!(mismatch.expected, "integer");
        }
        other => panic!("expected an argument type error, got: {other:?}"),
    }
}

#[test]
fn a_null_for_an_optional_argument_is_not_an_error() {
    let mut schema = ServiceSchema::new("profile");
    schema
        .argument(FieldDecl::new("age").typed(typing::integer()).optional())
        .unwrap()
        .step(StepDecl::new("noop").body(|_ex| Ok(Control::Continue)))
        .unwrap();

    let outcome = schema.run(json!({"age": null})).unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.execution().arg("age"), Some(&json!(null)));
}

#[test]
fn a_collected_error_breaks_the_loop_and_fails_the_outcome() {
    let mut schema = ServiceSchema::new("register");
    schema
        .step(StepDecl::new("check").body(|ex| {
            ex.fail("email", "taken")?;
            Ok(Control::Continue)
        }))
        .unwrap()
        .step(StepDecl::new("persist").body(|_ex| {
            panic!("the loop must break before this step");
        }))
        .unwrap();

    let outcome = schema.run(()).unwrap();
    assert!(outcome.failure());
    assert_eq!(outcome.state(), SettledState::Failed);
    assert_eq!(outcome.halt(), Some(Halt::Broke));
    assert_eq!(outcome.launched_steps(), ["check"]);
    assert_eq!(outcome.errors().get("email"), Some(&vec!["taken".to_string()]));
}

#[test]
fn a_breaking_warning_halts_the_loop_but_still_completes() {
    let mut schema = ServiceSchema::new("register");
    schema
        .configure(PolicyOverrides {
            break_on_warning: Some(true),
            ..PolicyOverrides::default()
        })
        .step(StepDecl::new("check").body(|ex| {
            ex.warn("email", "looks odd")?;
            Ok(Control::Continue)
        }))
        .unwrap()
        .step(StepDecl::new("persist").body(|_ex| {
            panic!("the loop must break before this step");
        }))
        .unwrap();

    let outcome = schema.run(()).unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.state(), SettledState::Completed);
    assert_eq!(outcome.halt(), Some(Halt::Broke));
    assert_eq!(
        outcome.warnings().get("email"),
        Some(&vec!["looks odd".to_string()])
    );
}

#[test]
fn cleanup_steps_run_unless_the_halt_is_a_stop() {
    let make_schema = |control: Control| {
        let mut schema = ServiceSchema::new("session");
        schema
            .step(StepDecl::new("work").body(move |_ex| Ok(control)))
            .unwrap()
            .step(
                StepDecl::new("release")
                    .always()
                    .body(|_ex| Ok(Control::Continue)),
            )
            .unwrap();
        schema
    };

    let outcome = make_schema(Control::Continue).run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Completed);
    assert_eq!(outcome.stats().cleanup, 0);
    assert_eq!(outcome.launched_steps(), ["work", "release"]);

    let outcome = make_schema(Control::Stop).run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Stopped);
    assert_eq!(outcome.halt(), Some(Halt::Stopped));
    assert_eq!(outcome.stats().cleanup, 0);
    assert_eq!(outcome.launched_steps(), ["work"]);

    let outcome = make_schema(Control::Fail).run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Failed);
    assert_eq!(outcome.halt(), Some(Halt::Failed));
    assert_eq!(outcome.stats().cleanup, 1);
    assert_eq!(outcome.launched_steps(), ["work", "release"]);
}

#[test]
fn an_always_step_declared_first_launches_before_its_siblings() {
    let mut schema = ServiceSchema::new("session");
    schema
        .step(
            StepDecl::new("acquire")
                .always()
                .body(|_ex| Ok(Control::Continue)),
        )
        .unwrap()
        .step(StepDecl::new("work").body(|_ex| Ok(Control::Continue)))
        .unwrap();

    let outcome = schema.run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Completed);
    assert_eq!(outcome.launched_steps(), ["acquire", "work"]);
    assert_eq!(outcome.stats().cleanup, 0);
}

#[test]
fn guards_skip_without_launching() {
    let mut schema = ServiceSchema::new("billing");
    schema
        .argument(FieldDecl::new("paid").typed(typing::boolean()))
        .unwrap()
        .step(
            StepDecl::new("invoice")
                .only_if(|ex| ex.arg("paid") == Some(&json!(true)))
                .body(|_ex| Ok(Control::Continue)),
        )
        .unwrap()
        .step(
            StepDecl::new("remind")
                .unless(|ex| ex.arg("paid") == Some(&json!(true)))
                .body(|_ex| Ok(Control::Continue)),
        )
        .unwrap();

    let outcome = schema.run(json!({"paid": false})).unwrap();
    assert_eq!(outcome.launched_steps(), ["remind"]);
    assert_eq!(outcome.stats().skipped, 1);

    let outcome = schema.run(json!({"paid": true})).unwrap();
    assert_eq!(outcome.launched_steps(), ["invoice"]);
    assert_eq!(outcome.stats().skipped, 1);
}

#[test]
fn callbacks_fire_in_order_on_a_successful_run() {
    let trace = make_trace();
    let mut schema = ServiceSchema::new("traced");
    let t = Arc::clone(&trace);
    schema.before_service(move |_ex| record(&t, "before_service"));
    let t = Arc::clone(&trace);
    schema.around_service(move |ex, inner| {
        record(&t, "around_service:enter");
        inner(ex);
        record(&t, "around_service:exit");
    });
    let t = Arc::clone(&trace);
    schema.before_step(move |_ex| record(&t, "before_step"));
    let t = Arc::clone(&trace);
    schema.around_step(move |ex, inner| {
        record(&t, "around_step:enter");
        inner(ex);
        record(&t, "around_step:exit");
    });
    let t = Arc::clone(&trace);
    schema.after_step(move |_ex| record(&t, "after_step"));
    let t = Arc::clone(&trace);
    schema.on_step_success(move |_ex| record(&t, "on_step_success"));
    let t = Arc::clone(&trace);
    schema.after_service(move |_ex| record(&t, "after_service"));
    let t = Arc::clone(&trace);
    schema.on_service_success(move |_ex| record(&t, "on_service_success"));
    let t = Arc::clone(&trace);
    schema
        .step(StepDecl::new("work").body(move |_ex| {
            record(&t, "body");
            Ok(Control::Continue)
        }))
        .unwrap();

    schema.run(()).unwrap();
    assert_eq!(
        recorded(&trace),
        [
            "before_service",
            "around_service:enter",
            "before_step",
            "around_step:enter",
            "body",
            "around_step:exit",
            "after_step",
            "on_step_success",
            "around_service:exit",
            "after_service",
            "on_service_success",
        ]
    );
}

#[test]
fn around_hooks_nest_first_registered_outermost() {
    let trace = make_trace();
    let mut schema = ServiceSchema::new("traced");
    let t = Arc::clone(&trace);
    schema.around_step(move |ex, inner| {
        record(&t, "first:enter");
        inner(ex);
        record(&t, "first:exit");
    });
    let t = Arc::clone(&trace);
    schema.around_step(move |ex, inner| {
        record(&t, "second:enter");
        inner(ex);
        record(&t, "second:exit");
    });
    let t = Arc::clone(&trace);
    schema
        .step(StepDecl::new("work").body(move |_ex| {
            record(&t, "body");
            Ok(Control::Continue)
        }))
        .unwrap();

    schema.run(()).unwrap();
    assert_eq!(
        recorded(&trace),
        [
            "first:enter",
            "second:enter",
            "body",
            "second:exit",
            "first:exit",
        ]
    );
}

#[test]
fn an_around_hook_may_suppress_the_body() {
    let trace = make_trace();
    let mut schema = ServiceSchema::new("gated");
    schema.output(FieldDecl::new("touched").untyped().optional()).unwrap();
    let t = Arc::clone(&trace);
    schema.around_step(move |_ex, _inner| record(&t, "gate"));
    let t = Arc::clone(&trace);
    schema
        .step(StepDecl::new("work").body(move |ex| {
            record(&t, "body");
            ex.set_output("touched", json!(true));
            Ok(Control::Continue)
        }))
        .unwrap();

    let outcome = schema.run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Completed);
    assert_eq!(recorded(&trace), ["gate"]);
    assert_eq!(outcome.output("touched"), None);
    assert_eq!(outcome.launched_steps(), ["work"]);
}

#[test]
fn immediate_variants_skip_their_callbacks() {
    let make_schema = |control: Control| {
        let trace = make_trace();
        let mut schema = ServiceSchema::new("abrupt");
        let t = Arc::clone(&trace);
        schema.after_step(move |_ex| record(&t, "after_step"));
        let t = Arc::clone(&trace);
        schema.on_step_success(move |_ex| record(&t, "on_step_success"));
        let t = Arc::clone(&trace);
        schema.on_step_failure(move |_ex| record(&t, "on_step_failure"));
        schema
            .step(StepDecl::new("work").body(move |_ex| Ok(control)))
            .unwrap();
        (schema, trace)
    };

    let (schema, trace) = make_schema(Control::FailImmediately);
    let outcome = schema.run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Failed);
    assert_eq!(outcome.halt(), Some(Halt::FailedNow));
    assert_eq!(recorded(&trace), ["on_step_failure"]);

    let (schema, trace) = make_schema(Control::StopImmediately);
    let outcome = schema.run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Stopped);
    assert_eq!(outcome.halt(), Some(Halt::StoppedNow));
    assert!(recorded(&trace).is_empty());
}

#[test]
fn fail_now_collects_the_message_and_halts() {
    let mut schema = ServiceSchema::new("register");
    schema
        .step(StepDecl::new("check").body(|ex| ex.fail_now("email", "taken")))
        .unwrap()
        .step(StepDecl::new("persist").body(|_ex| {
            panic!("the halt must land before this step");
        }))
        .unwrap();

    let outcome = schema.run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Failed);
    assert_eq!(outcome.halt(), Some(Halt::FailedNow));
    assert_eq!(outcome.errors().get("email"), Some(&vec!["taken".to_string()]));
}

#[test]
fn a_crash_dispatches_on_step_crash_and_surfaces_the_source() {
    let trace = make_trace();
    let mut schema = ServiceSchema::new("register");
    let t = Arc::clone(&trace);
    schema.on_step_crash(move |_ex, error| record(&t, &format!("crash: {error}")));
    schema
        .step(StepDecl::new("persist").body(|_ex| Err("disk offline".into())))
        .unwrap();

    match schema.run(()) {
        Err(EngineError::StepCrashed { step, source }) => {
            assert_eq!(step, "persist");
            assert_eq!(source.to_string(), "disk offline");
        }
        other => panic!("expected a crash error, got: {other:?}"),
    }
    assert_eq!(recorded(&trace), ["crash: disk offline"]);
}

#[test]
fn run_strict_raises_on_the_first_collected_error() {
    let mut schema = ServiceSchema::new("register");
    schema
        .step(StepDecl::new("check").body(|ex| {
            ex.fail("email", "taken")?;
            Ok(Control::Continue)
        }))
        .unwrap();

    match schema.run_strict(()) {
        Err(EngineError::Raised(raised)) => {
            assert_eq!(raised.log, LogKind::Errors);
            assert_eq!(raised.key, "email");
            assert_eq!(raised.text, "taken");
        }
        other => panic!("expected the collected error to raise, got: {other:?}"),
    }
}

#[test]
fn outputs_validate_only_on_a_successful_run() {
    let make_schema = |fail: bool| {
        let mut schema = ServiceSchema::new("report");
        schema
            .output(FieldDecl::new("message").typed(typing::string()))
            .unwrap()
            .step(StepDecl::new("compose").body(move |ex| {
                ex.set_output("message", json!(5));
                if fail {
                    ex.fail("base", "rejected")?;
                }
                Ok(Control::Continue)
            }))
            .unwrap();
        schema
    };

    match make_schema(false).run(()) {
        Err(EngineError::OutputType(mismatch)) => {
            assert_eq!(mismatch.field, "message");
            assert_eq!(mismatch.expected, "string");
        }
        other => panic!("expected an output type error, got: {other:?}"),
    }

    let outcome = make_schema(true).run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Failed);
}

#[test]
fn undeclared_arguments_pass_through_verbatim() {
    let mut schema = ServiceSchema::new("echo");
    schema
        .output(FieldDecl::new("seen").untyped().optional())
        .unwrap()
        .step(StepDecl::new("look").body(|ex| {
            let trace = ex.arg("trace").cloned();
            if let Some(value) = trace {
                ex.set_output("seen", value);
            }
            Ok(Control::Continue)
        }))
        .unwrap();

    let outcome = schema.run(json!({"trace": {"hop": 3}})).unwrap();
    assert_eq!(outcome.output("seen"), Some(&json!({"hop": 3})));
}

#[test]
fn class_overrides_keep_the_loop_going_past_errors() {
    let mut schema = ServiceSchema::new("audit");
    schema
        .configure(PolicyOverrides {
            break_on_error: Some(false),
            ..PolicyOverrides::default()
        })
        .step(StepDecl::new("first").body(|ex| {
            ex.fail("a", "bad")?;
            Ok(Control::Continue)
        }))
        .unwrap()
        .step(StepDecl::new("second").body(|ex| {
            ex.fail("b", "worse")?;
            Ok(Control::Continue)
        }))
        .unwrap();

    let outcome = schema.run(()).unwrap();
    assert_eq!(outcome.state(), SettledState::Failed);
    assert_eq!(outcome.halt(), None);
    assert_eq!(outcome.launched_steps(), ["first", "second"]);
    assert_eq!(outcome.errors().len(), 2);
}

#[test]
fn a_compiled_service_runs_many_times() {
    let mut schema = ServiceSchema::new("greet");
    schema
        .argument(FieldDecl::new("name").typed(typing::string()))
        .unwrap()
        .output(FieldDecl::new("message").typed(typing::string()))
        .unwrap()
        .step(StepDecl::new("compose").body(|ex| {
            let name: String = ex.arg_as("name")?;
            ex.set_output("message", json!(format!("hello {name}")));
            Ok(Control::Continue)
        }))
        .unwrap();
    let service = schema.compile().unwrap();

    let first = service.run(json!({"name": "kim"})).unwrap();
    let second = service.run(json!({"name": "ada"})).unwrap();
    assert_eq!(first.output("message"), Some(&json!("hello kim")));
    assert_eq!(second.output("message"), Some(&json!("hello ada")));
    assert_ne!(first.id(), second.id());
}
