/// Trait for implementing the register state of a stopped thread.
///
/// Implementations encapsulate the platform calling convention: the plan
/// machinery only ever speaks in terms of "the instruction address", "the
/// stack pointer", "the argument slots" and "the return value slot", and
/// the implementor maps those onto concrete registers (or stack slots, for
/// arguments that overflow the register file).
pub trait RegisterState {
    /// Returns the instruction address.
    fn instr_addr(&self) -> u64;

    /// Sets the instruction address.
    fn set_instr_addr(&mut self, addr: u64);

    /// Returns the stack pointer.
    fn stack_ptr(&self) -> u64;

    /// Sets the stack pointer.
    fn set_stack_ptr(&mut self, addr: u64);

    /// Assigns the given values to the argument slots of the platform
    /// calling convention, first value to first slot.
    fn set_arguments(&mut self, args: &[u64]);

    /// Returns the value held by the return-value slot of the platform
    /// calling convention.
    fn return_value(&self) -> u64;
}
