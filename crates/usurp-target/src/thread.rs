/// Trait providing functions for working with stopped threads of the
/// debug target.
///
/// A value of this type represents one thread *at one stop*: it is handed
/// out by [wait_stop](crate::ExecutionContext::wait_stop) and consumed by
/// [resume](crate::ExecutionContext::resume).
pub trait Thread {
    /// Returns the thread's ID.
    fn id(&self) -> u64;

    /// Returns the thread's instruction address at the stop.
    fn instr_addr(&self) -> u64;

    /// Returns whether the thread is in single-step mode.
    fn is_single_step(&self) -> bool;

    /// Enables or disables single-step mode for this thread.
    ///
    /// [resume](crate::ExecutionContext::resume) honors the mode: a thread
    /// in single-step mode executes one instruction and stops with a
    /// [Singlestep](crate::StopEvent::Singlestep) event.
    fn set_single_step(&mut self, enable: bool);
}
