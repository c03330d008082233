mod basic;
mod call_function;
mod call_user_expression;
mod stack;

use usurp_target::ExecutionContext;

pub use self::basic::{BasePlan, RunToAddressPlan, StepPlan};
pub use self::call_function::CallFunctionPlan;
pub use self::call_user_expression::CallUserExpressionPlan;
pub use self::stack::{MasterScope, PlanArena, PlanStack};
use crate::CheckerRegistry;
use crate::stop::StopReason;

/// Kind of a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanKind {
    /// Default continuation policy of a thread.
    Base,

    /// Single-step of one instruction.
    Step,

    /// Run until a given address is reached.
    RunToAddress,

    /// Injected function call.
    CallFunction,

    /// Injected user-expression evaluation.
    CallUserExpression,
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Base => "base",
            Self::Step => "step",
            Self::RunToAddress => "run-to-address",
            Self::CallFunction => "call-function",
            Self::CallUserExpression => "call-user-expression",
        })
    }
}

/// Cause of a single stop event, as seen by plans.
#[derive(Clone, Copy, Debug)]
pub enum StopCause {
    /// A breakpoint was hit at the given address.
    Breakpoint {
        /// Address of the breakpoint.
        addr: u64,
    },

    /// A watchpoint on the given data address was hit.
    Watchpoint {
        /// Address of the watched data.
        data_addr: u64,
    },

    /// A single-step completed.
    Singlestep,

    /// A signal was received.
    Signal {
        /// Number of the received signal.
        signum: i32,
    },
}

/// Answers a plan gives about one stop event of its thread.
#[derive(Clone, Copy, Debug)]
pub struct PlanDecision {
    /// Whether this plan's own objective accounts for the stop.
    pub explains_stop: bool,

    /// Whether the thread should report a user-visible stop.
    ///
    /// Only meaningful when the plan explains the stop; an unexplained
    /// stop is surfaced or swallowed by the plans beneath it.
    pub should_stop: bool,

    /// Whether the plan completed its objective and is eligible for
    /// popping.
    pub finished: bool,
}

/// A single unit of execution-control policy for one thread.
///
/// The set of plan kinds is closed: the plan stack reasons about masters
/// and discardability generically, and dispatches stop handling across
/// this enum.
pub enum Plan<C: ExecutionContext> {
    /// Default continuation policy (bottom of every stack).
    Base(BasePlan),

    /// Single-step plan.
    Step(StepPlan),

    /// Run-to-address plan.
    RunToAddress(RunToAddressPlan),

    /// Injected function call plan.
    CallFunction(CallFunctionPlan<C>),

    /// Injected user-expression plan.
    CallUserExpression(CallUserExpressionPlan<C>),
}

impl<C: ExecutionContext> Plan<C> {
    /// Returns the kind of this plan.
    pub const fn kind(&self) -> PlanKind {
        match self {
            Self::Base(_) => PlanKind::Base,
            Self::Step(_) => PlanKind::Step,
            Self::RunToAddress(_) => PlanKind::RunToAddress,
            Self::CallFunction(_) => PlanKind::CallFunction,
            Self::CallUserExpression(_) => PlanKind::CallUserExpression,
        }
    }

    /// Returns whether this plan's stop decisions are authoritative over
    /// the plans enclosing it.
    pub fn is_master(&self) -> bool {
        match self {
            Self::Base(_) | Self::Step(_) | Self::RunToAddress(_) => false,
            Self::CallFunction(plan) => plan.is_master(),
            Self::CallUserExpression(plan) => plan.is_master(),
        }
    }

    /// Returns whether this plan may be silently abandoned by a
    /// discard-to-depth unwind.
    pub fn okay_to_discard(&self) -> bool {
        match self {
            Self::Base(_) | Self::Step(_) | Self::RunToAddress(_) => true,
            Self::CallFunction(plan) => plan.okay_to_discard(),
            Self::CallUserExpression(plan) => plan.okay_to_discard(),
        }
    }

    /// Returns a description of this plan for diagnostics.
    pub fn description(&self) -> String {
        match self {
            Self::Base(_) => "thread default continuation".to_owned(),
            Self::Step(_) => "single-step one instruction".to_owned(),
            Self::RunToAddress(plan) => plan.description(),
            Self::CallFunction(plan) => plan.description(),
            Self::CallUserExpression(plan) => plan.description(),
        }
    }

    /// Returns whether this plan currently holds every other thread
    /// stopped.
    pub(crate) fn holds_other_threads(&self) -> bool {
        match self {
            Self::Base(_) | Self::Step(_) | Self::RunToAddress(_) => false,
            Self::CallFunction(plan) => plan.holds_other_threads(),
            Self::CallUserExpression(plan) => plan.holds_other_threads(),
        }
    }

    /// Asks this plan how to react to a stop of its thread.
    pub(crate) fn on_stop(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
        cause: &StopCause,
    ) -> crate::Result<PlanDecision, C::Error> {
        match self {
            Self::Base(plan) => Ok(plan.on_stop(cause)),
            Self::Step(plan) => Ok(plan.on_stop(cause)),
            Self::RunToAddress(plan) => plan.on_stop(ctx, cause),
            Self::CallFunction(plan) => plan.on_stop(ctx, thread, cause),
            Self::CallUserExpression(plan) => plan.on_stop(ctx, thread, cause),
        }
    }

    /// Returns the stop reason this plan surfaces for the current stop,
    /// given the generic reason derived from the stop event.
    ///
    /// Most plans pass the generic reason through; call plans override it
    /// with the reason they recorded at completion, and user-expression
    /// plans additionally merge checker diagnostics into it.
    pub(crate) fn real_stop_reason(
        &self,
        generic: StopReason,
        checkers: Option<&dyn CheckerRegistry>,
    ) -> StopReason {
        match self {
            Self::Base(_) | Self::Step(_) | Self::RunToAddress(_) => generic,
            Self::CallFunction(plan) => plan.real_stop_reason(generic),
            Self::CallUserExpression(plan) => plan.real_stop_reason(generic, checkers),
        }
    }
}

/// Maps a stop cause to the stop reason surfaced when no plan overrides
/// it.
pub(crate) fn generic_reason(cause: &StopCause) -> StopReason {
    use crate::stop::StopReasonKind;

    match cause {
        StopCause::Breakpoint { addr } => StopReason::with_description(
            StopReasonKind::Breakpoint,
            format!("breakpoint at {addr:#x}"),
        ),
        StopCause::Watchpoint { data_addr } => StopReason::with_description(
            StopReasonKind::Watchpoint,
            format!("watchpoint on {data_addr:#x}"),
        ),
        StopCause::Singlestep => StopReason::new(StopReasonKind::StepCompleted),
        StopCause::Signal { signum } => {
            StopReason::with_description(StopReasonKind::Signal, format!("signal {signum}"))
        }
    }
}
