/// Signal a step body returns to steer the rest of the run.
///
/// The `Immediately` variants express an exception-like abort: the engine
/// skips the step's `after_step` callbacks on top of halting the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    /// Proceed to the next step.
    #[default]
    Continue,
    /// Halt the primary loop; pending always-steps are skipped and the
    /// transaction commits.
    Stop,
    /// As `Stop`, skipping the step's own post callbacks.
    StopImmediately,
    /// Halt as failed; pending always-steps still run.
    Fail,
    /// As `Fail`, skipping the step's `after_step` callbacks.
    FailImmediately,
}

/// Any error a step body surfaces. A `MessageRaised` inside takes the
/// raised path; everything else is a crash.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// What a step body produces.
pub type StepOutcome = Result<Control, StepError>;
