use std::collections::HashMap;
use std::fmt::Write as _;

use usurp_target::ExecutionContext;

use super::{BasePlan, Plan};
use crate::error::Error;

/// How far a master plan's vote suppression reaches down the stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MasterScope {
    /// A master plan that does not explain a stop swallows it; no
    /// enclosing plan is consulted.
    #[default]
    SuppressAll,

    /// A master plan suppresses only the plans between itself and the
    /// next master plan below it, which gets its vote back.
    ToNextMaster,
}

/// Ordered, per-thread ownership structure of plans.
///
/// The bottom entry is always the thread's base continuation policy; the
/// top entry is the currently controlling plan and the only one consulted
/// about stop events (the plans below only vote when the top does not
/// explain a stop).
pub struct PlanStack<C: ExecutionContext> {
    plans: Vec<Plan<C>>,
}

impl<C: ExecutionContext> PlanStack<C> {
    /// Creates a stack holding only the base continuation plan.
    pub fn new() -> Self {
        Self {
            plans: vec![Plan::Base(BasePlan)],
        }
    }

    /// Returns the depth of the top plan (0 = base plan only).
    pub fn depth(&self) -> usize {
        self.plans.len() - 1
    }

    /// Places `plan` on top; it becomes the sole consulted plan until
    /// popped.
    pub fn push(&mut self, plan: Plan<C>) {
        self.plans.push(plan);
    }

    /// Removes and returns the top plan; control returns to the plan
    /// below.
    ///
    /// The base plan is never popped; `None` is returned instead.
    pub fn pop(&mut self) -> Option<Plan<C>> {
        if self.plans.len() > 1 {
            self.plans.pop()
        } else {
            None
        }
    }

    /// Returns the top (currently controlling) plan.
    pub fn current_top(&self) -> &Plan<C> {
        match self.plans.last() {
            Some(plan) => plan,
            None => unreachable!("plan stack without base plan"),
        }
    }

    pub(crate) fn top_mut(&mut self) -> &mut Plan<C> {
        match self.plans.last_mut() {
            Some(plan) => plan,
            None => unreachable!("plan stack without base plan"),
        }
    }

    pub(crate) fn plan_at_mut(&mut self, depth: usize) -> &mut Plan<C> {
        &mut self.plans[depth]
    }

    /// Removes and returns the plan at `depth`, which may sit below the
    /// top; the plans above it keep their relative order.
    ///
    /// The base plan is never removed.
    pub(crate) fn remove_at(&mut self, depth: usize) -> Option<Plan<C>> {
        if depth == 0 || depth >= self.plans.len() {
            return None;
        }

        Some(self.plans.remove(depth))
    }

    /// Attempts to unwind the stack down to `target_depth` (which becomes
    /// the new top).
    ///
    /// Fails without popping anything if any plan above `target_depth`
    /// has `okay_to_discard == false`: such a plan must run to completion
    /// or be explicitly, individually cancelled, not silently dropped
    /// because something else wants control.
    ///
    /// On success the popped plans are returned, top first, so the caller
    /// can run their cleanup (e.g. restoring the snapshot of an in-flight
    /// call).
    pub fn request_discard_to(
        &mut self,
        target_depth: usize,
    ) -> Result<Vec<Plan<C>>, Error<C::Error>> {
        let depth = self.depth();

        if target_depth > depth {
            return Err(Error::BadDiscardDepth {
                target: target_depth,
                depth,
            });
        }

        for d in target_depth + 1..=depth {
            if !self.plans[d].okay_to_discard() {
                tracing::debug!(
                    depth = d,
                    kind = %self.plans[d].kind(),
                    "discard refused"
                );

                return Err(Error::DiscardRefused {
                    depth: d,
                    kind: self.plans[d].kind(),
                });
            }
        }

        let mut popped = self.plans.split_off(target_depth + 1);
        popped.reverse();

        Ok(popped)
    }

    /// Returns a description of every plan on the stack, bottom first,
    /// for diagnostics.
    pub fn describe_all(&self) -> String {
        let mut out = String::new();

        for (depth, plan) in self.plans.iter().enumerate() {
            let _ = write!(out, "depth {depth}: [{}] {}", plan.kind(), plan.description());

            if plan.is_master() {
                out.push_str(" <master>");
            }

            if !plan.okay_to_discard() {
                out.push_str(" <not discardable>");
            }

            out.push('\n');
        }

        out
    }
}

impl<C: ExecutionContext> Default for PlanStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Plan stacks of every known thread, keyed by thread ID.
///
/// Plans hold no back-pointers to their thread; ownership lives here and
/// positions are plain depth integers, so a plan can be cancelled or
/// outlive a stop event without lifetime ambiguity.
pub struct PlanArena<C: ExecutionContext> {
    stacks: HashMap<u64, PlanStack<C>>,
}

impl<C: ExecutionContext> PlanArena<C> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            stacks: HashMap::new(),
        }
    }

    /// Returns the stack of the given thread, creating a base-only stack
    /// on first touch.
    pub fn stack_mut(&mut self, thread_id: u64) -> &mut PlanStack<C> {
        self.stacks.entry(thread_id).or_default()
    }

    /// Returns the stack of the given thread, if the thread is known.
    pub fn get(&self, thread_id: u64) -> Option<&PlanStack<C>> {
        self.stacks.get(&thread_id)
    }

    /// Drops the stack of an exited thread.
    pub fn remove_thread(&mut self, thread_id: u64) {
        self.stacks.remove(&thread_id);
    }
}

impl<C: ExecutionContext> Default for PlanArena<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use usurp_target::{BinaryContext, ExecutionContext, RegisterState, ResumeScope};
    use usurp_target::{StopEvent, Thread};

    use super::PlanStack;
    use crate::plan::{CallFunctionPlan, CallUserExpressionPlan, Plan, PlanKind, StepPlan};
    use crate::{CallDescriptor, Error};

    struct NullThread;

    impl Thread for NullThread {
        fn id(&self) -> u64 {
            0
        }

        fn instr_addr(&self) -> u64 {
            0
        }

        fn is_single_step(&self) -> bool {
            false
        }

        fn set_single_step(&mut self, _enable: bool) {}
    }

    #[derive(Clone)]
    struct NullRegisters;

    impl RegisterState for NullRegisters {
        fn instr_addr(&self) -> u64 {
            0
        }

        fn set_instr_addr(&mut self, _addr: u64) {}

        fn stack_ptr(&self) -> u64 {
            0
        }

        fn set_stack_ptr(&mut self, _addr: u64) {}

        fn set_arguments(&mut self, _args: &[u64]) {}

        fn return_value(&self) -> u64 {
            0
        }
    }

    struct NullContext;

    impl ExecutionContext for NullContext {
        type Registers = NullRegisters;
        type StoppedThread = NullThread;
        type Error = Infallible;

        async fn wait_stop(&mut self) -> Result<StopEvent<Self>, Self::Error> {
            unreachable!()
        }

        fn binary_ctx(&self) -> BinaryContext {
            BinaryContext {
                is_big_container: true,
                is_little_endian: true,
            }
        }

        fn read_memory(&self, _addr: u64, _buf: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn write_memory(&mut self, _addr: u64, _buf: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn get_registers(
            &mut self,
            _thread: &Self::StoppedThread,
        ) -> Result<Self::Registers, Self::Error> {
            Ok(NullRegisters)
        }

        fn set_registers(
            &mut self,
            _thread: &Self::StoppedThread,
            _regs: Self::Registers,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn add_breakpoint(&mut self, _addr: u64) -> Result<(), Self::Error> {
            Ok(())
        }

        fn remove_breakpoint(&mut self, _addr: u64) -> Result<(), Self::Error> {
            Ok(())
        }

        fn resume(
            &mut self,
            _thread: Self::StoppedThread,
            _scope: ResumeScope,
        ) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn descriptor() -> CallDescriptor {
        CallDescriptor::new(0x1000, 0x2000)
    }

    #[test]
    fn base_plan_is_never_popped() {
        let mut stack = PlanStack::<NullContext>::new();

        assert_eq!(stack.depth(), 0);
        assert!(stack.pop().is_none());
        assert_eq!(stack.current_top().kind(), PlanKind::Base);
    }

    #[test]
    fn user_expression_plan_flags_hold() {
        let plan = CallUserExpressionPlan::<NullContext>::new(1, descriptor());

        assert!(plan.is_master());
        assert!(!plan.okay_to_discard());
    }

    #[test]
    fn discard_refused_by_user_expression_plan() {
        let mut stack = PlanStack::<NullContext>::new();

        stack.push(Plan::Step(StepPlan::new()));
        stack.push(Plan::CallUserExpression(CallUserExpressionPlan::new(
            1,
            descriptor(),
        )));
        stack.push(Plan::Step(StepPlan::new()));

        let Err(err) = stack.request_discard_to(0) else {
            panic!("discard went through a pinned plan");
        };

        assert!(matches!(
            err,
            Error::DiscardRefused {
                depth: 2,
                kind: PlanKind::CallUserExpression,
            }
        ));

        // the stack is unchanged
        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.current_top().kind(), PlanKind::Step);
    }

    #[test]
    fn discard_pops_exactly_the_targeted_range() {
        let mut stack = PlanStack::<NullContext>::new();

        stack.push(Plan::Step(StepPlan::new()));
        stack.push(Plan::CallFunction(CallFunctionPlan::new(1, descriptor())));
        stack.push(Plan::Step(StepPlan::new()));

        let popped = stack.request_discard_to(1).unwrap();

        let kinds = popped.iter().map(Plan::kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec![PlanKind::Step, PlanKind::CallFunction]);

        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current_top().kind(), PlanKind::Step);
    }

    #[test]
    fn discard_beyond_top_is_rejected() {
        let mut stack = PlanStack::<NullContext>::new();

        let Err(err) = stack.request_discard_to(3) else {
            panic!("out-of-range discard target was accepted");
        };

        assert!(matches!(err, Error::BadDiscardDepth { target: 3, depth: 0 }));
    }

    #[test]
    fn describe_all_reports_flags() {
        let mut stack = PlanStack::<NullContext>::new();

        stack.push(Plan::CallUserExpression(CallUserExpressionPlan::new(
            7,
            descriptor(),
        )));

        let description = stack.describe_all();

        assert!(description.contains("depth 0: [base]"));
        assert!(description.contains("depth 1: [call-user-expression]"));
        assert!(description.contains("<master>"));
        assert!(description.contains("<not discardable>"));
    }
}
