use serde::{Deserialize, Serialize};

use crate::messages::AddPolicy;

/// Resolved toggles one invocation runs under.
///
/// A policy is produced by layering, lowest first: built-in defaults,
/// process settings, class overrides (nearest ancestor wins per field),
/// per-call overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPolicy {
    pub break_on_error: bool,
    pub raise_on_error: bool,
    pub rollback_on_error: bool,
    pub break_on_warning: bool,
    pub raise_on_warning: bool,
    pub rollback_on_warning: bool,
    pub load_errors: bool,
    pub load_warnings: bool,
    pub use_transactions: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            break_on_error: true,
            raise_on_error: false,
            rollback_on_error: true,
            break_on_warning: false,
            raise_on_warning: false,
            rollback_on_warning: false,
            load_errors: true,
            load_warnings: true,
            use_transactions: true,
        }
    }
}

impl RunPolicy {
    /// Returns `self` with every `Some` field of `overrides` applied.
    pub fn layered(&self, overrides: &PolicyOverrides) -> RunPolicy {
        RunPolicy {
            break_on_error: overrides.break_on_error.unwrap_or(self.break_on_error),
            raise_on_error: overrides.raise_on_error.unwrap_or(self.raise_on_error),
            rollback_on_error: overrides.rollback_on_error.unwrap_or(self.rollback_on_error),
            break_on_warning: overrides.break_on_warning.unwrap_or(self.break_on_warning),
            raise_on_warning: overrides.raise_on_warning.unwrap_or(self.raise_on_warning),
            rollback_on_warning: overrides
                .rollback_on_warning
                .unwrap_or(self.rollback_on_warning),
            load_errors: overrides.load_errors.unwrap_or(self.load_errors),
            load_warnings: overrides.load_warnings.unwrap_or(self.load_warnings),
            use_transactions: overrides.use_transactions.unwrap_or(self.use_transactions),
        }
    }

    /// Add-policy the errors log of an invocation runs under.
    pub fn error_add_policy(&self) -> AddPolicy {
        AddPolicy {
            break_on_add: self.break_on_error,
            raise_on_add: self.raise_on_error,
            rollback_on_add: self.rollback_on_error,
        }
    }

    /// Add-policy the warnings log of an invocation runs under.
    pub fn warning_add_policy(&self) -> AddPolicy {
        AddPolicy {
            break_on_add: self.break_on_warning,
            raise_on_add: self.raise_on_warning,
            rollback_on_add: self.rollback_on_warning,
        }
    }
}

/// Partial policy; `None` fields defer to the layer below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    pub break_on_error: Option<bool>,
    pub raise_on_error: Option<bool>,
    pub rollback_on_error: Option<bool>,
    pub break_on_warning: Option<bool>,
    pub raise_on_warning: Option<bool>,
    pub rollback_on_warning: Option<bool>,
    pub load_errors: Option<bool>,
    pub load_warnings: Option<bool>,
    pub use_transactions: Option<bool>,
}

impl PolicyOverrides {
    /// Merges two partials; `self` wins wherever both are set.
    pub fn merged_over(&self, base: &PolicyOverrides) -> PolicyOverrides {
        PolicyOverrides {
            break_on_error: self.break_on_error.or(base.break_on_error),
            raise_on_error: self.raise_on_error.or(base.raise_on_error),
            rollback_on_error: self.rollback_on_error.or(base.rollback_on_error),
            break_on_warning: self.break_on_warning.or(base.break_on_warning),
            raise_on_warning: self.raise_on_warning.or(base.raise_on_warning),
            rollback_on_warning: self.rollback_on_warning.or(base.rollback_on_warning),
            load_errors: self.load_errors.or(base.load_errors),
            load_warnings: self.load_warnings.or(base.load_warnings),
            use_transactions: self.use_transactions.or(base.use_transactions),
        }
    }
}
