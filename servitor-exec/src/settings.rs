use std::sync::{Arc, RwLock};

use servitor_core::config::RunPolicy;

/// Process-wide default policy, the lowest layer of the resolution
/// chain.
///
/// An explicit handle rather than a global: clone it to share, pass it
/// to [`crate::Invoker::settings`]. Runs snapshot the defaults at start,
/// so later mutation never affects an invocation in flight, and child
/// invocations resolve against the snapshot of their root run.
#[derive(Clone, Debug, Default)]
pub struct EngineSettings {
    inner: Arc<RwLock<RunPolicy>>,
}

impl EngineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RunPolicy {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn update(&self, apply: impl FnOnce(&mut RunPolicy)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
    }

    /// Restores the built-in defaults.
    pub fn reset(&self) {
        self.update(|policy| *policy = RunPolicy::default());
    }

    pub fn set_break_on_error(&self, on: bool) {
        self.update(|policy| policy.break_on_error = on);
    }

    pub fn set_raise_on_error(&self, on: bool) {
        self.update(|policy| policy.raise_on_error = on);
    }

    pub fn set_rollback_on_error(&self, on: bool) {
        self.update(|policy| policy.rollback_on_error = on);
    }

    pub fn set_break_on_warning(&self, on: bool) {
        self.update(|policy| policy.break_on_warning = on);
    }

    pub fn set_raise_on_warning(&self, on: bool) {
        self.update(|policy| policy.raise_on_warning = on);
    }

    pub fn set_rollback_on_warning(&self, on: bool) {
        self.update(|policy| policy.rollback_on_warning = on);
    }

    pub fn set_load_errors(&self, on: bool) {
        self.update(|policy| policy.load_errors = on);
    }

    pub fn set_load_warnings(&self, on: bool) {
        self.update(|policy| policy.load_warnings = on);
    }

    pub fn set_use_transactions(&self, on: bool) {
        self.update(|policy| policy.use_transactions = on);
    }
}
