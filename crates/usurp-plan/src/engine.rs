use usurp_target::{ExecutionContext, ResumeScope, StopEvent, Thread};

use crate::call::CallDescriptor;
use crate::checker::CheckerRegistry;
use crate::error::{ContextError, Error};
use crate::plan::{CallFunctionPlan, CallUserExpressionPlan, Plan, PlanKind, RunToAddressPlan};
use crate::plan::{MasterScope, PlanArena, PlanStack, StepPlan, StopCause, generic_reason};
use crate::stop::{StopReason, StopReasonKind};

/// Outcome of an injected call, as reported to the requesting client.
pub enum CallOutcome<C: ExecutionContext> {
    /// The call returned normally through the sentinel return site.
    ///
    /// The thread's register/stack state has been restored to the
    /// pre-call snapshot.
    Returned {
        /// The calling thread, left stopped.
        thread: C::StoppedThread,

        /// Return value of the called function, per the platform calling
        /// convention.
        value: u64,

        /// The stop reason recorded at completion.
        reason: StopReason,
    },

    /// The call aborted on an unexpected stop (tolerant descriptor) or
    /// was otherwise ended with an error.
    ///
    /// The thread's register/stack state has been restored; the plan was
    /// popped.
    Aborted {
        /// The thread the call was aborted on, left stopped.
        thread: C::StoppedThread,

        /// The stop reason explaining the abort.
        reason: StopReason,
    },

    /// A stop surfaced that is not the call's completion; the call plan
    /// remains on the stack and re-evaluates on the next stop.
    ///
    /// Resume the call with [PlanEngine::resume_call] (passing
    /// `call_thread` back), or end it with [PlanEngine::cancel_call].
    Interrupted {
        /// The thread that surfaced the stop (not necessarily the calling
        /// thread), left stopped.
        thread: C::StoppedThread,

        /// ID of the thread whose call plan is still in flight.
        call_thread: u64,

        /// The surfaced stop reason.
        reason: StopReason,
    },
}

impl<C: ExecutionContext> std::fmt::Debug for CallOutcome<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Returned {
                thread,
                value,
                reason,
            } => f
                .debug_struct("Returned")
                .field("thread", &thread.id())
                .field("value", value)
                .field("reason", reason)
                .finish(),
            Self::Aborted { thread, reason } => f
                .debug_struct("Aborted")
                .field("thread", &thread.id())
                .field("reason", reason)
                .finish(),
            Self::Interrupted {
                thread,
                call_thread,
                reason,
            } => f
                .debug_struct("Interrupted")
                .field("thread", &thread.id())
                .field("call_thread", call_thread)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Verdict of one pass of the plan stack over a stop event.
enum StopVerdict<C: ExecutionContext> {
    /// No plan wants the stop surfaced; silently resume.
    Swallow,

    /// The stop is user-visible.
    Surface(StopReason),

    /// The top plan completed its objective and was popped.
    Finished {
        plan: Plan<C>,
        reason: StopReason,
    },
}

/// The execution-control engine of one debugged process.
///
/// Owns the execution context, the per-thread plan stacks, and the
/// optional checker registry, and exposes the client-facing operations:
/// injected calls, stepping, run-to-address, discard requests and plan
/// diagnostics.
pub struct PlanEngine<C: ExecutionContext> {
    ctx: C,
    arena: PlanArena<C>,
    checkers: Option<Box<dyn CheckerRegistry>>,
    master_scope: MasterScope,
}

impl<C: ExecutionContext> PlanEngine<C> {
    /// Creates an engine over the given execution context, with no
    /// checker registry and the default master-suppression scope.
    pub fn new(ctx: C) -> Self {
        Self {
            ctx,
            arena: PlanArena::new(),
            checkers: None,
            master_scope: MasterScope::default(),
        }
    }

    /// Configures the checker registry consulted when user-expression
    /// calls halt.
    pub fn with_checkers(mut self, checkers: Box<dyn CheckerRegistry>) -> Self {
        self.checkers = Some(checkers);
        self
    }

    /// Configures how far a master plan's vote suppression reaches.
    pub const fn with_master_scope(mut self, scope: MasterScope) -> Self {
        self.master_scope = scope;
        self
    }

    /// Returns the underlying execution context.
    pub const fn context(&self) -> &C {
        &self.ctx
    }

    /// Returns the underlying execution context, mutably.
    pub const fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Returns a description of every plan on the given thread's stack,
    /// for diagnostics.
    pub fn describe_plans(&self, thread_id: u64) -> Option<String> {
        self.arena.get(thread_id).map(PlanStack::describe_all)
    }

    /// Drops the plan stack of an exited thread.
    pub fn thread_exited(&mut self, thread_id: u64) {
        self.arena.remove_thread(thread_id);
    }

    /// Calls the function described by `descriptor` on the given stopped
    /// thread, blocking until the injected call resolves.
    ///
    /// On setup failure no plan is pushed and the thread is untouched.
    #[tracing::instrument(
        name = "CallFunction",
        skip_all,
        fields(
            tid = thread.id(),
            fn_addr = format_args!("{:#x}", descriptor.function_addr()),
        ),
    )]
    pub async fn call_function(
        &mut self,
        thread: C::StoppedThread,
        descriptor: CallDescriptor,
    ) -> crate::Result<CallOutcome<C>, C::Error> {
        let call_thread = thread.id();

        let mut plan = CallFunctionPlan::new(call_thread, descriptor);
        plan.materialize(&mut self.ctx, &thread)?;

        self.arena
            .stack_mut(call_thread)
            .push(Plan::CallFunction(plan));

        self.drive_call(thread, call_thread).await
    }

    /// Evaluates a user expression by calling its materialized function on
    /// the given stopped thread, blocking until the call resolves.
    ///
    /// The pushed plan is a master plan and not discardable; stop reasons
    /// of the completed call carry checker diagnostics when a registry is
    /// configured.
    #[tracing::instrument(
        name = "CallUserExpression",
        skip_all,
        fields(
            tid = thread.id(),
            fn_addr = format_args!("{:#x}", descriptor.function_addr()),
        ),
    )]
    pub async fn call_user_expression(
        &mut self,
        thread: C::StoppedThread,
        descriptor: CallDescriptor,
    ) -> crate::Result<CallOutcome<C>, C::Error> {
        let call_thread = thread.id();

        let mut plan = CallUserExpressionPlan::new(call_thread, descriptor);
        plan.materialize(&mut self.ctx, &thread)?;

        self.arena
            .stack_mut(call_thread)
            .push(Plan::CallUserExpression(plan));

        self.drive_call(thread, call_thread).await
    }

    /// Resumes an injected call previously reported as
    /// [Interrupted](CallOutcome::Interrupted).
    ///
    /// `thread` is the stopped thread to resume (the one the interruption
    /// surfaced on) and `call_thread` identifies the thread whose call
    /// plan is in flight; the two differ when another thread's stop
    /// interrupted the call.
    pub async fn resume_call(
        &mut self,
        thread: C::StoppedThread,
        call_thread: u64,
    ) -> crate::Result<CallOutcome<C>, C::Error> {
        if !self.has_call_in_flight(call_thread) {
            return Err(Error::NoCallInFlight(call_thread));
        }

        self.drive_call(thread, call_thread).await
    }

    /// Explicitly cancels the in-flight call plan of the given thread.
    ///
    /// This targeted action is permitted even for non-discardable plans;
    /// the thread's register/stack state is restored exactly as a normal
    /// completion would, and the popped plan's stop reason is returned.
    pub fn cancel_call(
        &mut self,
        thread: &C::StoppedThread,
    ) -> crate::Result<StopReason, C::Error> {
        let Self { ctx, arena, .. } = self;

        let stack = arena.stack_mut(thread.id());

        // cancel in place first; the plan is only popped once the thread
        // was actually restored, so a context failure leaves it retryable
        match stack.top_mut() {
            Plan::CallFunction(call) => call.cancel(ctx, thread)?,
            Plan::CallUserExpression(call) => call.cancel(ctx, thread)?,
            _ => return Err(Error::NoCallInFlight(thread.id())),
        }

        let Some(plan) = stack.pop() else {
            unreachable!("call plan matched above");
        };

        Ok(plan.real_stop_reason(StopReason::new(StopReasonKind::None), None))
    }

    /// Single-steps the given thread, blocking until the step completes
    /// or another stop surfaces.
    pub async fn step(
        &mut self,
        mut thread: C::StoppedThread,
    ) -> crate::Result<(C::StoppedThread, StopReason), C::Error> {
        self.arena
            .stack_mut(thread.id())
            .push(Plan::Step(StepPlan::new()));

        loop {
            match self.drive_until_verdict(thread).await? {
                (stopped, StopVerdict::Swallow) => thread = stopped,
                (stopped, StopVerdict::Surface(reason))
                | (stopped, StopVerdict::Finished { reason, .. }) => {
                    break Ok((stopped, reason));
                }
            }
        }
    }

    /// Runs the given thread until `addr` is reached, blocking until then
    /// or until another stop surfaces.
    pub async fn run_to_address(
        &mut self,
        mut thread: C::StoppedThread,
        addr: u64,
    ) -> crate::Result<(C::StoppedThread, StopReason), C::Error> {
        let mut plan = RunToAddressPlan::new(addr);
        plan.arm(&mut self.ctx)?;

        self.arena
            .stack_mut(thread.id())
            .push(Plan::RunToAddress(plan));

        loop {
            match self.drive_until_verdict(thread).await? {
                (stopped, StopVerdict::Swallow) => thread = stopped,
                (stopped, StopVerdict::Surface(reason))
                | (stopped, StopVerdict::Finished { reason, .. }) => {
                    break Ok((stopped, reason));
                }
            }
        }
    }

    /// Unwinds the given thread's plan stack down to `target_depth`.
    ///
    /// Refused (leaving the stack untouched) when any plan above
    /// `target_depth` is not discardable. In-flight call plans that do
    /// get discarded are cancelled, so their snapshots are restored.
    pub fn discard_plans_to(
        &mut self,
        thread: &C::StoppedThread,
        target_depth: usize,
    ) -> crate::Result<(), C::Error> {
        let Self { ctx, arena, .. } = self;

        let popped = arena
            .stack_mut(thread.id())
            .request_discard_to(target_depth)?;

        for plan in popped {
            match plan {
                Plan::CallFunction(mut plan) if plan.is_running() => {
                    plan.cancel(ctx, thread)?;
                }
                Plan::CallUserExpression(mut plan) if plan.is_running() => {
                    plan.cancel(ctx, thread)?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn has_call_in_flight(&self, thread_id: u64) -> bool {
        self.arena.get(thread_id).is_some_and(|stack| {
            matches!(
                stack.current_top().kind(),
                PlanKind::CallFunction | PlanKind::CallUserExpression
            )
        })
    }

    /// Drives the stop-event loop until the call plan of `call_thread`
    /// resolves or a stop surfaces.
    async fn drive_call(
        &mut self,
        thread: C::StoppedThread,
        call_thread: u64,
    ) -> crate::Result<CallOutcome<C>, C::Error> {
        let mut thread = thread;

        loop {
            let (stopped, verdict) = self.drive_until_verdict(thread).await?;

            match verdict {
                StopVerdict::Swallow => thread = stopped,
                StopVerdict::Finished { plan, reason } if stopped.id() == call_thread => {
                    let value = match &plan {
                        Plan::CallFunction(plan) => plan.return_value(),
                        Plan::CallUserExpression(plan) => plan.return_value(),
                        // a plan pushed above the call finished; the call
                        // is still in flight
                        _ => {
                            break Ok(CallOutcome::Interrupted {
                                thread: stopped,
                                call_thread,
                                reason,
                            });
                        }
                    };

                    break Ok(match value {
                        Some(value) => CallOutcome::Returned {
                            thread: stopped,
                            value,
                            reason,
                        },
                        None => CallOutcome::Aborted {
                            thread: stopped,
                            reason,
                        },
                    });
                }
                StopVerdict::Finished { reason, .. } | StopVerdict::Surface(reason) => {
                    break Ok(CallOutcome::Interrupted {
                        thread: stopped,
                        call_thread,
                        reason,
                    });
                }
            }
        }
    }

    /// Resumes `thread` and waits for the next stop event, running it
    /// through the stopping thread's plan stack.
    async fn drive_until_verdict(
        &mut self,
        thread: C::StoppedThread,
    ) -> crate::Result<(C::StoppedThread, StopVerdict<C>), C::Error> {
        self.resume_thread(thread)?;

        let (stopped, cause) = match self.ctx.wait_stop().await.map_err(ContextError)? {
            StopEvent::Breakpoint { thread } => {
                let addr = thread.instr_addr();
                (thread, StopCause::Breakpoint { addr })
            }
            StopEvent::Watchpoint { thread, data_addr } => {
                (thread, StopCause::Watchpoint { data_addr })
            }
            StopEvent::Singlestep { thread } => (thread, StopCause::Singlestep),
            StopEvent::Signal { thread, signum } => (thread, StopCause::Signal { signum }),
            StopEvent::Exited { exit_code } => {
                tracing::warn!(exit_code, "target exited during an injected call");

                return Err(Error::ExitedDuringCall(exit_code));
            }
        };

        let verdict = self.evaluate_stop(&stopped, &cause)?;

        Ok((stopped, verdict))
    }

    /// Runs one stop event through the stopping thread's plan stack.
    ///
    /// Only the top plan may finish. When the top plan does not explain
    /// the stop, the plans beneath it vote, subject to master
    /// suppression: a master plan that does not explain a stop claims it
    /// anyway and swallows it (or defers to the next master below,
    /// depending on the configured scope).
    fn evaluate_stop(
        &mut self,
        thread: &C::StoppedThread,
        cause: &StopCause,
    ) -> crate::Result<StopVerdict<C>, C::Error> {
        let Self {
            ctx,
            arena,
            checkers,
            master_scope,
        } = self;

        let checkers = checkers.as_deref();
        let stack = arena.stack_mut(thread.id());

        let top_depth = stack.depth();
        let decision = stack.top_mut().on_stop(ctx, thread, cause)?;

        if decision.finished {
            let Some(plan) = stack.pop() else {
                unreachable!("base plan reported finished");
            };

            let reason = plan.real_stop_reason(generic_reason(cause), checkers);

            tracing::debug!(
                tid = thread.id(),
                kind = %plan.kind(),
                %reason,
                "plan finished"
            );

            return Ok(StopVerdict::Finished { plan, reason });
        }

        if decision.explains_stop {
            return Ok(if decision.should_stop {
                let reason = stack
                    .current_top()
                    .real_stop_reason(generic_reason(cause), checkers);

                StopVerdict::Surface(reason)
            } else {
                StopVerdict::Swallow
            });
        }

        // The top plan does not explain the stop: walk down the stack.
        let mut suppressing = stack.current_top().is_master();
        let mut depth = top_depth;

        while depth > 0 {
            depth -= 1;

            if suppressing {
                match master_scope {
                    MasterScope::SuppressAll => return Ok(StopVerdict::Swallow),
                    MasterScope::ToNextMaster => {
                        if !stack.plan_at_mut(depth).is_master() {
                            continue;
                        }
                    }
                }
            }

            let decision = stack.plan_at_mut(depth).on_stop(ctx, thread, cause)?;

            if decision.finished {
                // a lower plan resolved (e.g. an interrupted call aborted
                // on an unexpected stop); it must not stay on the stack
                let Some(plan) = stack.remove_at(depth) else {
                    unreachable!("base plan reported finished");
                };

                let reason = plan.real_stop_reason(generic_reason(cause), checkers);

                tracing::debug!(
                    tid = thread.id(),
                    kind = %plan.kind(),
                    %reason,
                    "plan finished below the top of the stack"
                );

                if decision.explains_stop {
                    return Ok(if decision.should_stop {
                        StopVerdict::Surface(reason)
                    } else {
                        StopVerdict::Swallow
                    });
                }

                // a resolved plan no longer suppresses anything
                suppressing = false;
                continue;
            }

            if decision.explains_stop {
                return Ok(if decision.should_stop {
                    let reason = stack
                        .plan_at_mut(depth)
                        .real_stop_reason(generic_reason(cause), checkers);

                    StopVerdict::Surface(reason)
                } else {
                    StopVerdict::Swallow
                });
            }

            suppressing = stack.plan_at_mut(depth).is_master();
        }

        // only reachable when a master suppressed the remaining plans,
        // base plan included
        Ok(StopVerdict::Swallow)
    }

    /// Resumes the given thread, holding every other thread stopped while
    /// the top plan of its stack requires it.
    ///
    /// The thread is put in single-step mode while a step plan is on top
    /// of its stack, so the target executes one instruction and reports a
    /// single-step stop.
    fn resume_thread(&mut self, mut thread: C::StoppedThread) -> crate::Result<(), C::Error> {
        let top = self.arena.stack_mut(thread.id()).current_top();

        thread.set_single_step(top.kind() == PlanKind::Step);

        let scope = if top.holds_other_threads() {
            ResumeScope::OnlyThread
        } else {
            ResumeScope::AllThreads
        };

        self.ctx.resume(thread, scope).map_err(ContextError)?;

        Ok(())
    }
}
