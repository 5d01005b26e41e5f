#![forbid(unsafe_code)]

//! Runtime engine for declared services.
//!
//! Schemas, type rules, and the invocation state live in
//! `servitor-core`; this crate drives an invocation through the state
//! machine and exposes the calling surface.

pub mod engine;
pub mod settings;

pub use crate::engine::{
    EngineError, IntoArguments, Invoker, Perform, RunOutcome, SettledState, StepStats,
};
pub use crate::settings::EngineSettings;
