use usurp_target::ExecutionContext;

use super::call_function::CallFunctionPlan;
use super::{PlanDecision, StopCause};
use crate::call::CallDescriptor;
use crate::checker::CheckerRegistry;
use crate::stop::{StopReason, StopReasonKind};

/// Plan driving a user-expression evaluation through an injected call.
///
/// A user expression is user-generated, so the plan owns its thread until
/// it resolves: it is a master plan (background breakpoint noise during
/// the call is not misreported as the user's stop) and it is not
/// discardable (an in-flight expression either completes or is explicitly
/// cancelled). Both flags hold for the plan's entire lifetime.
pub struct CallUserExpressionPlan<C: ExecutionContext> {
    call: CallFunctionPlan<C>,
}

impl<C: ExecutionContext> CallUserExpressionPlan<C> {
    /// Creates a user-expression call plan for the given thread and
    /// descriptor.
    pub fn new(thread_id: u64, descriptor: CallDescriptor) -> Self {
        let mut call = CallFunctionPlan::new(thread_id, descriptor);
        call.set_is_master(true);
        call.set_okay_to_discard(false);

        Self { call }
    }

    /// Returns whether this plan is a master plan (always true).
    pub const fn is_master(&self) -> bool {
        self.call.is_master()
    }

    /// Returns whether this plan may be silently discarded (always
    /// false).
    pub const fn okay_to_discard(&self) -> bool {
        self.call.okay_to_discard()
    }

    /// Returns the value the expression call returned, if it completed
    /// normally.
    pub const fn return_value(&self) -> Option<u64> {
        self.call.return_value()
    }

    /// Returns whether the injected call is currently executing.
    pub const fn is_running(&self) -> bool {
        self.call.is_running()
    }

    pub(super) fn holds_other_threads(&self) -> bool {
        self.call.holds_other_threads()
    }

    pub(super) fn description(&self) -> String {
        format!("user expression: {}", self.call.description())
    }

    pub(crate) fn materialize(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
    ) -> crate::Result<(), C::Error> {
        self.call.materialize(ctx, thread)
    }

    pub(super) fn on_stop(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
        cause: &StopCause,
    ) -> crate::Result<PlanDecision, C::Error> {
        self.call.on_stop(ctx, thread, cause)
    }

    pub(crate) fn cancel(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
    ) -> crate::Result<(), C::Error> {
        self.call.cancel(ctx, thread)
    }

    /// Returns the stop reason of the completed call, with checker
    /// diagnostics merged in.
    ///
    /// When a checker registry is configured and flags the address where
    /// execution actually halted, the reason's kind becomes a checker
    /// violation and the checker's text is appended to its description.
    /// With no registry configured, the underlying reason passes through
    /// unchanged.
    pub(super) fn real_stop_reason(
        &self,
        generic: StopReason,
        checkers: Option<&dyn CheckerRegistry>,
    ) -> StopReason {
        let mut reason = self.call.real_stop_reason(generic);

        let (Some(addr), Some(checkers)) = (self.call.stop_addr(), checkers) else {
            return reason;
        };

        let verdict = checkers.check_address(addr);

        if !verdict.is_valid {
            tracing::warn!(
                addr = format_args!("{addr:#x}"),
                description = verdict.description.as_deref().unwrap_or_default(),
                "checker flagged expression stop site"
            );

            reason.set_kind(StopReasonKind::CheckerViolation);

            if let Some(description) = verdict.description {
                reason.append_description(description);
            }
        }

        reason
    }
}
