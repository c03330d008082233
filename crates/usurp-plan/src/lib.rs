//! This crate implements the execution-control core of a native debugger:
//! the machinery that temporarily commandeers a stopped thread of a live
//! process to make it execute an arbitrary function (typically, a
//! user-typed expression compiled into the target), observes the outcome,
//! and restores the thread to its original execution intent afterward.
//!
//! # Plans and the plan stack
//!
//! Every execution-control intent on a thread (step, run-to-address,
//! injected function call, user-expression evaluation) is a [Plan](plan::Plan).
//! Plans nest: each thread owns an ordered [PlanStack](plan::PlanStack)
//! whose bottom entry is the thread's default continuation policy and
//! whose top entry is the currently controlling intent. On every stop
//! event, the top plan is asked whether the stop is its own doing, whether
//! the user should see it, and whether the plan is done; finished plans
//! are popped and control returns to the plan below.
//!
//! Two flags steer the stack's policy decisions:
//! - a *master* plan owns the thread until it resolves: stops it does not
//!   explain are swallowed instead of being surfaced through the plans
//!   beneath it;
//! - a plan that is *not* discardable blocks any attempt to unwind the
//!   stack past it; it runs to completion or is individually cancelled.
//!
//! # Injected calls
//!
//! The [PlanEngine](engine::PlanEngine) exposes the client-facing
//! operations. [call_function](engine::PlanEngine::call_function) and
//! [call_user_expression](engine::PlanEngine::call_user_expression)
//! materialize a call frame on the stopped thread (snapshotting its
//! register state first), resume it, and drive the stop-event loop until
//! the injected call returns through a sentinel return site, aborts, or is
//! cancelled. Whatever the outcome, the thread's register and stack state
//! is restored exactly to the pre-call snapshot.
//!
//! The target itself is reached through the [ExecutionContext](usurp_target::ExecutionContext)
//! trait of the `usurp-target` crate; this crate never touches registers,
//! memory or breakpoints directly.

/// Module implementing the plan engine (the client-facing call interface).
pub mod engine;

/// Module implementing plans and the per-thread plan stack.
pub mod plan;

mod call;
mod checker;
mod error;
mod stop;

pub use self::call::CallDescriptor;
pub use self::checker::{CheckerRegistry, CheckerVerdict};
pub use self::error::{ContextError, Error, Result};
pub use self::stop::{StopReason, StopReasonKind};
