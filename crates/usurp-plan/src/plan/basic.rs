use usurp_target::ExecutionContext;

use super::{PlanDecision, StopCause};
use crate::error::ContextError;

/// Default continuation policy of a thread.
///
/// Sits at the bottom of every plan stack and is never popped: it explains
/// every stop no other plan claims, surfaces it to the client, and never
/// finishes.
#[derive(Default)]
pub struct BasePlan;

impl BasePlan {
    pub(super) fn on_stop(&self, _cause: &StopCause) -> PlanDecision {
        PlanDecision {
            explains_stop: true,
            should_stop: true,
            finished: false,
        }
    }
}

/// Plan completing when its thread finishes a single-step.
#[derive(Default)]
pub struct StepPlan;

impl StepPlan {
    /// Creates a single-step plan.
    pub const fn new() -> Self {
        Self
    }

    pub(super) fn on_stop(&mut self, cause: &StopCause) -> PlanDecision {
        match cause {
            StopCause::Singlestep => PlanDecision {
                explains_stop: true,
                should_stop: true,
                finished: true,
            },
            _ => PlanDecision {
                explains_stop: false,
                should_stop: true,
                finished: false,
            },
        }
    }
}

/// Plan running its thread until a given address is reached.
pub struct RunToAddressPlan {
    target_addr: u64,
    armed: bool,
}

impl RunToAddressPlan {
    /// Creates a plan running until `target_addr` is reached.
    ///
    /// The plan must be [armed](Self::arm) before its thread is resumed.
    pub const fn new(target_addr: u64) -> Self {
        Self {
            target_addr,
            armed: false,
        }
    }

    /// Arms the breakpoint backing this plan.
    pub fn arm<C: ExecutionContext>(&mut self, ctx: &mut C) -> crate::Result<(), C::Error> {
        ctx.add_breakpoint(self.target_addr).map_err(ContextError)?;
        self.armed = true;

        Ok(())
    }

    pub(super) fn description(&self) -> String {
        format!("run to {:#x}", self.target_addr)
    }

    pub(super) fn on_stop<C: ExecutionContext>(
        &mut self,
        ctx: &mut C,
        cause: &StopCause,
    ) -> crate::Result<PlanDecision, C::Error> {
        match cause {
            StopCause::Breakpoint { addr } if *addr == self.target_addr => {
                if self.armed {
                    ctx.remove_breakpoint(self.target_addr)
                        .map_err(ContextError)?;
                    self.armed = false;
                }

                Ok(PlanDecision {
                    explains_stop: true,
                    should_stop: true,
                    finished: true,
                })
            }
            _ => Ok(PlanDecision {
                explains_stop: false,
                should_stop: true,
                finished: false,
            }),
        }
    }
}
