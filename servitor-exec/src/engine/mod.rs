//! The invocation engine.
//!
//! [`Perform`] is the calling surface: anything that can hand over a
//! compiled service gets `run`, `run_strict`, and the [`Invoker`]
//! builder for per-call configuration. The runner drives the state
//! machine; dispatch composes callbacks around it.

mod dispatch;
mod error;
mod invoker;
mod outcome;
mod runner;

pub use error::EngineError;
pub use invoker::{IntoArguments, Invoker, Perform};
pub use outcome::{RunOutcome, SettledState, StepStats};
