use std::sync::Arc;

use serde_json::json;
use servitor_core::error::DefinitionError;
use servitor_core::schema::{FieldDecl, ServiceSchema, StepDecl};
use servitor_core::types::{Control, Kind};
use servitor_core::typing;

fn noop_step(name: &str) -> StepDecl {
    StepDecl::new(name).body(|_ex| Ok(Control::Continue))
}

fn make_base() -> ServiceSchema {
    let mut schema = ServiceSchema::new("register_account");
    schema
        .argument(FieldDecl::new("email").typed(typing::string()))
        .unwrap()
        .argument(FieldDecl::new("age").typed(typing::integer()))
        .unwrap()
        .output(FieldDecl::new("account_id").typed(typing::string()))
        .unwrap()
        .step(noop_step("check_email"))
        .unwrap()
        .step(noop_step("persist"))
        .unwrap()
        .step(noop_step("notify"))
        .unwrap();
    schema
}

fn step_names(schema: &ServiceSchema) -> Vec<String> {
    schema
        .compile()
        .unwrap()
        .steps()
        .keys()
        .cloned()
        .collect()
}

#[test]
fn compile_is_memoized_until_the_next_mutation() {
    let mut schema = make_base();
    let first = schema.compile().unwrap();
    let second = schema.compile().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    schema
        .argument(FieldDecl::new("referrer").typed(typing::string()).optional())
        .unwrap();
    let third = schema.compile().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(third.arguments().contains_key("referrer"));
    assert!(!first.arguments().contains_key("referrer"));
}

#[test]
fn repeated_compiles_agree_on_order() {
    let schema = make_base();
    let first: Vec<String> = schema.compile().unwrap().steps().keys().cloned().collect();
    let second: Vec<String> = schema.compile().unwrap().steps().keys().cloned().collect();
    assert_eq!(first, second);
    assert_eq!(first, vec!["check_email", "persist", "notify"]);
}

#[test]
fn child_operations_never_touch_the_parent_view() {
    let parent = Arc::new(make_base());
    let before = parent.compile().unwrap();

    let mut child = ServiceSchema::extending("register_premium_account", &parent);
    child
        .argument(FieldDecl::new("plan").typed(typing::string()))
        .unwrap()
        .remove_step("notify")
        .unwrap()
        .step(noop_step("charge"))
        .unwrap();
    let child_view = child.compile().unwrap();

    let after = parent.compile().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(!Arc::ptr_eq(&child_view, &after));
    assert!(after.steps().contains_key("notify"));
    assert!(!after.arguments().contains_key("plan"));

    assert!(!child_view.steps().contains_key("notify"));
    assert!(child_view.arguments().contains_key("plan"));
    assert!(child_view.arguments().contains_key("email"));
}

#[test]
fn child_redeclaration_replaces_the_inherited_field_in_place() {
    let parent = Arc::new(make_base());
    let mut child = ServiceSchema::extending("register_minor_account", &parent);
    child
        .argument(
            FieldDecl::new("age")
                .typed(typing::coercible_integer())
                .optional()
                .default_value(json!(13)),
        )
        .unwrap();

    let view = child.compile().unwrap();
    let order: Vec<&String> = view.arguments().keys().collect();
    assert_eq!(order, ["email", "age"]);

    let age = &view.arguments()["age"];
    assert!(age.optional);
    assert!(age.default.is_some());
    assert_eq!(age.type_summary(), "integer (coercible from string)");
}

#[test]
fn inherited_declarations_replay_root_first() {
    let parent = Arc::new(make_base());
    let mut child = ServiceSchema::extending("register_audited_account", &parent);
    child.step(noop_step("audit")).unwrap();
    assert_eq!(
        step_names(&child),
        vec!["check_email", "persist", "notify", "audit"]
    );
}

#[test]
fn steps_anchor_before_and_after_named_siblings() {
    let mut schema = make_base();
    schema
        .step(noop_step("normalize").before("check_email"))
        .unwrap()
        .step(noop_step("log_attempt").after("persist"))
        .unwrap();
    assert_eq!(
        step_names(&schema),
        vec!["normalize", "check_email", "persist", "log_attempt", "notify"]
    );
}

#[test]
fn anchoring_after_the_last_step_appends() {
    let mut schema = make_base();
    schema.step(noop_step("cleanup").after("notify")).unwrap();
    assert_eq!(
        step_names(&schema),
        vec!["check_email", "persist", "notify", "cleanup"]
    );
}

#[test]
fn redeclaring_a_step_keeps_its_position_unless_anchored() {
    let mut schema = make_base();
    schema.step(noop_step("persist")).unwrap();
    assert_eq!(
        step_names(&schema),
        vec!["check_email", "persist", "notify"]
    );

    schema.step(noop_step("notify").before("check_email")).unwrap();
    assert_eq!(
        step_names(&schema),
        vec!["notify", "check_email", "persist"]
    );
}

#[test]
fn child_can_anchor_into_the_inherited_order() {
    let parent = Arc::new(make_base());
    let mut child = ServiceSchema::extending("register_checked_account", &parent);
    child.step(noop_step("screen").after("check_email")).unwrap();
    assert_eq!(
        step_names(&child),
        vec!["check_email", "screen", "persist", "notify"]
    );
}

#[test]
fn anchoring_to_an_unknown_step_is_rejected() {
    let mut schema = make_base();
    let err = schema
        .step(noop_step("orphan").after("missing"))
        .unwrap_err();
    match err {
        DefinitionError::UnknownAnchor { name, anchor, .. } => {
            assert_eq!(name, "orphan");
            assert_eq!(anchor, "missing");
        }
        other => panic!("expected UnknownAnchor, got: {other:?}"),
    }
}

#[test]
fn removal_of_an_unknown_declaration_is_rejected() {
    let mut schema = make_base();
    let err = schema.remove_argument("phone").unwrap_err();
    assert!(matches!(
        err,
        DefinitionError::UnknownRemoval {
            kind: Kind::Argument,
            ..
        }
    ));

    // Right name, wrong kind.
    let err = schema.remove_step("email").unwrap_err();
    assert!(matches!(
        err,
        DefinitionError::UnknownRemoval { kind: Kind::Step, .. }
    ));
}

#[test]
fn child_can_remove_an_inherited_step() {
    let parent = Arc::new(make_base());
    let mut child = ServiceSchema::extending("register_quiet_account", &parent);
    child.remove_step("notify").unwrap();
    assert_eq!(step_names(&child), vec!["check_email", "persist"]);
}

#[test]
fn invalid_and_reserved_names_are_rejected() {
    let mut schema = ServiceSchema::new("naming");
    let err = schema
        .argument(FieldDecl::new("with-dash").typed(typing::string()))
        .unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidName { .. }));

    let err = schema
        .argument(FieldDecl::new("errors").typed(typing::string()))
        .unwrap_err();
    assert!(matches!(err, DefinitionError::ReservedName { .. }));

    let err = schema.step(noop_step("2fast")).unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidName { .. }));
}

#[test]
fn the_same_name_cannot_span_two_kinds() {
    let mut schema = make_base();
    let err = schema
        .output(FieldDecl::new("email").typed(typing::string()))
        .unwrap_err();
    match err {
        DefinitionError::CrossKindCollision {
            kind,
            existing,
            name,
            ..
        } => {
            assert_eq!(kind, Kind::Output);
            assert_eq!(existing, Kind::Argument);
            assert_eq!(name, "email");
        }
        other => panic!("expected CrossKindCollision, got: {other:?}"),
    }

    let err = schema.step(noop_step("account_id")).unwrap_err();
    assert!(matches!(err, DefinitionError::CrossKindCollision { .. }));
}

#[test]
fn a_field_without_type_rules_is_rejected_unless_untyped() {
    let mut schema = ServiceSchema::new("typing_posture");
    let err = schema.argument(FieldDecl::new("payload")).unwrap_err();
    assert!(matches!(err, DefinitionError::MissingType { .. }));

    schema
        .argument(FieldDecl::new("payload").untyped())
        .unwrap();
    assert!(schema.compile().unwrap().arguments()["payload"].untyped);
}

#[test]
fn relax_typing_lifts_the_rule_requirement_for_the_whole_subtree() {
    let mut parent = ServiceSchema::new("loose_base");
    parent.relax_typing();
    parent.argument(FieldDecl::new("anything")).unwrap();

    let parent = Arc::new(parent);
    let mut child = ServiceSchema::extending("loose_child", &parent);
    child.argument(FieldDecl::new("more")).unwrap();
    let view = child.compile().unwrap();
    assert_eq!(view.arguments()["anything"].type_summary(), "any");
    assert_eq!(view.arguments()["more"].type_summary(), "any");
}

#[test]
fn contextual_outputs_are_rejected() {
    let mut schema = ServiceSchema::new("context_posture");
    let err = schema
        .output(FieldDecl::new("token").typed(typing::string()).contextual())
        .unwrap_err();
    assert!(matches!(err, DefinitionError::ContextualOutput { .. }));
}

#[test]
fn conflicting_if_and_unless_guards_are_rejected() {
    let mut schema = ServiceSchema::new("guard_posture");
    let err = schema
        .step(
            noop_step("gated")
                .only_if(|_ex| true)
                .unless(|_ex| false),
        )
        .unwrap_err();
    assert!(matches!(err, DefinitionError::ConflictingGuards { .. }));
}

#[test]
fn a_later_guard_of_the_same_mode_wins() {
    let mut schema = ServiceSchema::new("guard_posture");
    schema
        .step(noop_step("gated").only_if(|_ex| false).only_if(|_ex| true))
        .unwrap();
    let view = schema.compile().unwrap();
    assert_eq!(
        view.steps()["gated"].guard.as_ref().map(|g| g.mode()),
        Some("if")
    );
}

#[test]
fn a_step_without_body_resolves_its_handler_by_name() {
    let mut schema = ServiceSchema::new("handled");
    schema.handler("persist", |_ex| Ok(Control::Continue));
    schema.step(StepDecl::new("persist")).unwrap();
    assert!(schema.compile().is_ok());
}

#[test]
fn a_child_handler_shadows_the_parent_registration() {
    let mut parent = ServiceSchema::new("handled_base");
    parent.handler("persist", |ex| {
        ex.set_output("who", json!("parent"));
        Ok(Control::Continue)
    });
    parent.step(StepDecl::new("persist")).unwrap();
    let parent = Arc::new(parent);

    let mut child = ServiceSchema::extending("handled_child", &parent);
    child.handler("persist", |ex| {
        ex.set_output("who", json!("child"));
        Ok(Control::Continue)
    });
    // Both compile; the runtime behavior of the shadowed handler is
    // covered by the engine tests.
    assert!(parent.compile().is_ok());
    assert!(child.compile().is_ok());
}

#[test]
fn a_step_without_body_or_handler_fails_compile() {
    let mut schema = ServiceSchema::new("unhandled");
    schema.step(StepDecl::new("ghost")).unwrap();
    let err = schema.compile().unwrap_err();
    match err {
        DefinitionError::MissingStepBody { name, .. } => assert_eq!(name, "ghost"),
        other => panic!("expected MissingStepBody, got: {other:?}"),
    }
}

#[test]
fn a_named_predicate_must_be_registered_somewhere_in_the_chain() {
    let mut schema = ServiceSchema::new("predicated");
    schema
        .step(noop_step("gated").only_if_named("ready"))
        .unwrap();
    let err = schema.compile().unwrap_err();
    assert!(matches!(err, DefinitionError::UnknownPredicate { .. }));

    schema.predicate("ready", |_ex| true);
    assert!(schema.compile().is_ok());
}

#[test]
fn describe_reports_fields_steps_and_callbacks() {
    let mut schema = make_base();
    schema
        .step(noop_step("audit").always().only_if(|_ex| true))
        .unwrap();
    schema.before_step(|_ex| {});
    schema.before_step(|_ex| {});
    schema.around_service(|ex, proceed| proceed(ex));

    let report = schema.compile().unwrap().describe();
    assert_eq!(report.service, "register_account");
    assert_eq!(report.fields.len(), 3);
    assert_eq!(report.steps.len(), 4);

    let audit = report
        .steps
        .iter()
        .find(|step| step.name == "audit")
        .unwrap();
    assert!(audit.always);
    assert_eq!(audit.guard.as_deref(), Some("if"));

    let rendered = serde_json::to_value(&report).unwrap();
    let callbacks = rendered["callbacks"].as_array().unwrap();
    assert!(callbacks
        .iter()
        .any(|entry| entry["point"] == "before_step" && entry["count"] == 2));
    assert!(callbacks
        .iter()
        .any(|entry| entry["point"] == "around_service" && entry["count"] == 1));

    let age = rendered["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|field| field["name"] == "age")
        .cloned()
        .unwrap();
    assert_eq!(age["kind"], "argument");
    assert_eq!(age["type"], "integer");
}
