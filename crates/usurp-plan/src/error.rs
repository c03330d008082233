use crate::plan::PlanKind;

/// Execution context error.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct ContextError<E>(pub E);

/// Error type of this crate.
///
/// Generic over the error type of the execution context in use.
#[derive(thiserror::Error, Debug)]
pub enum Error<E> {
    /// An execution context error occurred.
    #[error(transparent)]
    Context(#[from] ContextError<E>),

    /// The call frame could not be materialized in the target.
    ///
    /// No plan was pushed; the thread is untouched.
    #[error("failed to materialize the call frame in the target")]
    CallSetup(#[source] E),

    /// A discard request was refused by a plan that must run to
    /// completion.
    #[error("plan at depth {depth} ({kind}) is not discardable")]
    DiscardRefused {
        /// Depth of the refusing plan.
        depth: usize,

        /// Kind of the refusing plan.
        kind: PlanKind,
    },

    /// A discard request targeted a depth beyond the top of the stack.
    #[error("discard target depth {target} exceeds plan stack depth {depth}")]
    BadDiscardDepth {
        /// Requested target depth.
        target: usize,

        /// Current depth of the stack.
        depth: usize,
    },

    /// A call operation was requested on a thread with no call plan on
    /// top of its stack.
    #[error("no call plan is active on thread {0}")]
    NoCallInFlight(u64),

    /// The target exited while an injected call was in flight.
    #[error("target exited (code {0}) during an injected call")]
    ExitedDuringCall(i32),
}

/// Result type of this crate.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
