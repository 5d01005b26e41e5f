use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::DefinitionError;
use crate::schema::decl::{FieldDecl, StepDecl};
use crate::types::{Kind, Position};

pub(crate) static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Names the runtime claims for itself on every service.
pub(crate) const RESERVED: &[&str] = &[
    "arguments",
    "outputs",
    "errors",
    "warnings",
    "context",
    "service",
    "run",
];

pub(crate) fn check_name(service: &str, kind: Kind, name: &str) -> Result<(), DefinitionError> {
    if !NAME_RE.is_match(name) {
        return Err(DefinitionError::InvalidName {
            service: service.to_string(),
            kind,
            name: name.to_string(),
        });
    }
    if RESERVED.contains(&name) {
        return Err(DefinitionError::ReservedName {
            service: service.to_string(),
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// A name may be redeclared within its kind; holding another kind is a
/// collision.
pub(crate) fn check_collision(
    service: &str,
    kind: Kind,
    name: &str,
    view: &IndexMap<String, Kind>,
) -> Result<(), DefinitionError> {
    match view.get(name) {
        Some(existing) if *existing != kind => Err(DefinitionError::CrossKindCollision {
            service: service.to_string(),
            kind,
            existing: *existing,
            name: name.to_string(),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn check_field(
    service: &str,
    kind: Kind,
    decl: &FieldDecl,
    relaxed_typing: bool,
) -> Result<(), DefinitionError> {
    if decl.rules.is_empty() && !decl.untyped && !relaxed_typing {
        return Err(DefinitionError::MissingType {
            service: service.to_string(),
            kind,
            name: decl.name.clone(),
        });
    }
    if decl.contextual && kind == Kind::Output {
        return Err(DefinitionError::ContextualOutput {
            service: service.to_string(),
            name: decl.name.clone(),
        });
    }
    Ok(())
}

pub(crate) fn check_step(
    service: &str,
    decl: &StepDecl,
    view: &IndexMap<String, Kind>,
) -> Result<(), DefinitionError> {
    if decl.conflicting {
        return Err(DefinitionError::ConflictingGuards {
            service: service.to_string(),
            name: decl.name.clone(),
        });
    }
    if let Position::Before(anchor) | Position::After(anchor) = &decl.position {
        if view.get(anchor) != Some(&Kind::Step) {
            return Err(DefinitionError::UnknownAnchor {
                service: service.to_string(),
                name: decl.name.clone(),
                anchor: anchor.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_removal(
    service: &str,
    kind: Kind,
    name: &str,
    view: &IndexMap<String, Kind>,
) -> Result<(), DefinitionError> {
    if view.get(name) == Some(&kind) {
        Ok(())
    } else {
        Err(DefinitionError::UnknownRemoval {
            service: service.to_string(),
            kind,
            name: name.to_string(),
        })
    }
}
