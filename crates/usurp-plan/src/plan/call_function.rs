use usurp_target::{ExecutionContext, RegisterState, Thread};

use super::{PlanDecision, StopCause, generic_reason};
use crate::call::CallDescriptor;
use crate::error::{ContextError, Error};
use crate::stop::{StopReason, StopReasonKind};

/// Register/stack snapshot of a thread, captured before an injected call
/// mutates it.
///
/// The holding plan clears it only after a successful restore, so a
/// restore that fails at the context level can be retried.
struct StateSnapshot<C: ExecutionContext> {
    regs: C::Registers,
}

impl<C: ExecutionContext> StateSnapshot<C> {
    fn capture(ctx: &mut C, thread: &C::StoppedThread) -> Result<Self, C::Error> {
        let regs = ctx.get_registers(thread)?;

        Ok(Self { regs })
    }

    fn stack_ptr(&self) -> u64 {
        self.regs.stack_ptr()
    }

    fn cloned_regs(&self) -> C::Registers {
        self.regs.clone()
    }

    fn restore(&self, ctx: &mut C, thread: &C::StoppedThread) -> Result<(), C::Error> {
        ctx.set_registers(thread, self.cloned_regs())
    }
}

/// Progress of an injected call.
enum CallState {
    /// The call frame is not materialized yet.
    Pending,

    /// The target is executing the injected call.
    Running,

    /// The call returned through the sentinel, with this value.
    Returned(u64),

    /// The call was aborted or cancelled.
    Errored,
}

/// Plan driving one thread through one injected function invocation.
///
/// On materialization the thread's register state is snapshotted, a call
/// frame targeting the descriptor's function is written in its place, and
/// a breakpoint is armed at the sentinel return site. Completion is a hit
/// on that sentinel *at the snapshotted stack depth*; a hit at any other
/// depth is a recursive re-entry and keeps the call running.
///
/// By default a call plan is neither a master plan nor protected from
/// discarding: a plain function call can be abandoned if something more
/// urgent needs the thread.
pub struct CallFunctionPlan<C: ExecutionContext> {
    thread_id: u64,
    descriptor: CallDescriptor,
    snapshot: Option<StateSnapshot<C>>,
    expected_stack_ptr: u64,
    state: CallState,
    stop_addr: Option<u64>,
    stop_reason: Option<StopReason>,
    is_master: bool,
    okay_to_discard: bool,
}

impl<C: ExecutionContext> CallFunctionPlan<C> {
    /// Creates a call plan for the given thread and descriptor.
    pub const fn new(thread_id: u64, descriptor: CallDescriptor) -> Self {
        Self {
            thread_id,
            descriptor,
            snapshot: None,
            expected_stack_ptr: 0,
            state: CallState::Pending,
            stop_addr: None,
            stop_reason: None,
            is_master: false,
            okay_to_discard: true,
        }
    }

    /// Returns whether this plan is a master plan.
    pub const fn is_master(&self) -> bool {
        self.is_master
    }

    /// Returns whether this plan may be silently discarded.
    pub const fn okay_to_discard(&self) -> bool {
        self.okay_to_discard
    }

    pub(super) const fn set_is_master(&mut self, is_master: bool) {
        self.is_master = is_master;
    }

    pub(super) const fn set_okay_to_discard(&mut self, okay: bool) {
        self.okay_to_discard = okay;
    }

    /// Returns the value the call returned, if it completed normally.
    pub const fn return_value(&self) -> Option<u64> {
        match self.state {
            CallState::Returned(value) => Some(value),
            _ => None,
        }
    }

    /// Returns whether the injected call is currently executing.
    pub const fn is_running(&self) -> bool {
        matches!(self.state, CallState::Running)
    }

    /// Returns the address where execution actually halted, once the call
    /// completed or aborted.
    pub const fn stop_addr(&self) -> Option<u64> {
        self.stop_addr
    }

    pub(super) fn holds_other_threads(&self) -> bool {
        self.is_running() && self.descriptor.stops_other_threads()
    }

    pub(super) fn description(&self) -> String {
        format!(
            "call function at {:#x} on thread {}",
            self.descriptor.function_addr(),
            self.thread_id
        )
    }

    /// Materializes the call frame on the stopped thread.
    ///
    /// Snapshots the register state, pushes the sentinel return address,
    /// redirects the program counter to the function, assigns the argument
    /// slots, and arms the sentinel breakpoint. Any context failure here is
    /// a call setup failure: the plan must not be pushed, and the thread is
    /// left in its pre-call state (failures after the register write
    /// restore the snapshot before reporting).
    pub(crate) fn materialize(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
    ) -> crate::Result<(), C::Error> {
        let snapshot = StateSnapshot::capture(ctx, thread).map_err(Error::CallSetup)?;

        let bin_ctx = ctx.binary_ctx();
        let mut regs = snapshot.cloned_regs();

        let sentinel_slot = regs.stack_ptr() - bin_ctx.addr_len();
        ctx.write_memory(
            sentinel_slot,
            &bin_ctx.encode_addr(self.descriptor.return_site()),
        )
        .map_err(Error::CallSetup)?;

        regs.set_stack_ptr(sentinel_slot);
        regs.set_instr_addr(self.descriptor.function_addr());
        regs.set_arguments(&self.descriptor.effective_args());

        ctx.set_registers(thread, regs).map_err(Error::CallSetup)?;

        if let Err(e) = ctx.add_breakpoint(self.descriptor.return_site()) {
            // the frame is already in place; undo it before reporting
            snapshot.restore(ctx, thread).map_err(ContextError)?;

            return Err(Error::CallSetup(e));
        }

        self.expected_stack_ptr = snapshot.stack_ptr();
        self.snapshot = Some(snapshot);
        self.state = CallState::Running;

        tracing::debug!(
            tid = self.thread_id,
            fn_addr = format_args!("{:#x}", self.descriptor.function_addr()),
            return_site = format_args!("{:#x}", self.descriptor.return_site()),
            "call frame materialized"
        );

        Ok(())
    }

    pub(super) fn on_stop(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
        cause: &StopCause,
    ) -> crate::Result<PlanDecision, C::Error> {
        match cause {
            StopCause::Breakpoint { addr } if *addr == self.descriptor.return_site() => {
                let regs = ctx.get_registers(thread).map_err(ContextError)?;

                if regs.stack_ptr() != self.expected_stack_ptr {
                    // recursive re-entry of the trampoline, not completion
                    tracing::debug!(
                        tid = self.thread_id,
                        stack_ptr = format_args!("{:#x}", regs.stack_ptr()),
                        expected = format_args!("{:#x}", self.expected_stack_ptr),
                        "sentinel hit at wrong stack depth"
                    );

                    return Ok(PlanDecision {
                        explains_stop: true,
                        should_stop: false,
                        finished: false,
                    });
                }

                let value = regs.return_value();

                self.stop_addr = Some(*addr);
                self.finish(ctx, thread, CallState::Returned(value), {
                    StopReason::new(StopReasonKind::CallReturn)
                })?;

                tracing::debug!(
                    tid = self.thread_id,
                    value = format_args!("{value:#x}"),
                    "injected call returned"
                );

                Ok(PlanDecision {
                    explains_stop: true,
                    should_stop: true,
                    finished: true,
                })
            }
            cause => {
                self.stop_addr = Some(thread.instr_addr());

                if self.descriptor.discards_on_error() {
                    let mut reason = generic_reason(cause);
                    reason.append_description("unexpected stop aborted the injected call");

                    self.finish(ctx, thread, CallState::Errored, reason)?;

                    tracing::warn!(tid = self.thread_id, ?cause, "injected call aborted");

                    Ok(PlanDecision {
                        explains_stop: false,
                        should_stop: true,
                        finished: true,
                    })
                } else {
                    Ok(PlanDecision {
                        explains_stop: false,
                        should_stop: true,
                        finished: false,
                    })
                }
            }
        }
    }

    /// Explicitly cancels the in-flight call, restoring the thread.
    ///
    /// This is the one path allowed to end a non-discardable call plan
    /// besides completion.
    pub(crate) fn cancel(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
    ) -> crate::Result<(), C::Error> {
        self.finish(ctx, thread, CallState::Errored, {
            StopReason::with_description(StopReasonKind::None, "injected call cancelled")
        })?;

        tracing::debug!(tid = self.thread_id, "injected call cancelled");

        Ok(())
    }

    /// Ends the call: disarms the sentinel and restores the snapshot.
    ///
    /// Runs on every exit path (completion, abort, cancellation), so the
    /// thread is always left in its pre-call state. On a context failure
    /// the snapshot and running state are kept, so the caller can retry.
    fn finish(
        &mut self,
        ctx: &mut C,
        thread: &C::StoppedThread,
        state: CallState,
        reason: StopReason,
    ) -> crate::Result<(), C::Error> {
        if self.is_running() {
            ctx.remove_breakpoint(self.descriptor.return_site())
                .map_err(ContextError)?;
        }

        if let Some(snapshot) = self.snapshot.as_ref() {
            snapshot.restore(ctx, thread).map_err(ContextError)?;
        }

        self.snapshot = None;
        self.state = state;
        self.stop_reason = Some(reason);

        Ok(())
    }

    pub(super) fn real_stop_reason(&self, generic: StopReason) -> StopReason {
        self.stop_reason.clone().unwrap_or(generic)
    }
}
