use std::future::Future;

use crate::registers::RegisterState;
use crate::thread::Thread;

/// Trait implementing the target-side primitives of a debugger.
///
/// One value of this type drives one debugged process. All mutation of the
/// target (registers, memory, breakpoints, resumption) goes through this
/// trait, so the plan machinery stays agnostic of the transport
/// (`ptrace`, a remote stub, a scripted fake, ...).
pub trait ExecutionContext {
    /// Type of the register state of a stopped thread.
    type Registers: RegisterState + Clone;

    /// Type of a stopped thread of the target.
    type StoppedThread: Thread;

    /// Error returned by this trait.
    type Error: std::error::Error;

    /// Waits for the next stop event from the target.
    ///
    /// Stop events of a given thread are delivered strictly in the order
    /// the target generates them.
    fn wait_stop(&mut self) -> impl Future<Output = Result<StopEvent<Self>, Self::Error>>;

    /// Returns layout information about the target's address space.
    fn binary_ctx(&self) -> BinaryContext;

    /// Reads data from the target's address space.
    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes data to the target's address space.
    fn write_memory(&mut self, addr: u64, buf: &[u8]) -> Result<(), Self::Error>;

    /// Retrieves registers of the given stopped thread.
    fn get_registers(
        &mut self,
        thread: &Self::StoppedThread,
    ) -> Result<Self::Registers, Self::Error>;

    /// Modifies registers of the given stopped thread.
    fn set_registers(
        &mut self,
        thread: &Self::StoppedThread,
        regs: Self::Registers,
    ) -> Result<(), Self::Error>;

    /// Adds a breakpoint at the given address of the target's address
    /// space, for all threads.
    fn add_breakpoint(&mut self, addr: u64) -> Result<(), Self::Error>;

    /// Removes a breakpoint from the given address of the target's address
    /// space.
    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), Self::Error>;

    /// Resumes the thread's execution.
    ///
    /// `scope` selects whether the rest of the process runs as well, or
    /// whether every other thread is held stopped while this one executes.
    ///
    /// If the thread is in [single-step mode](Thread::set_single_step),
    /// it executes a single instruction and stops again.
    fn resume(&mut self, thread: Self::StoppedThread, scope: ResumeScope)
    -> Result<(), Self::Error>;
}

/// Resumption scope of a stopped thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeScope {
    /// Resume the whole process.
    AllThreads,

    /// Resume this thread only; every other thread stays stopped.
    OnlyThread,
}

/// Event describing why the target stopped.
pub enum StopEvent<C: ExecutionContext + ?Sized> {
    /// A thread has stopped by triggering a breakpoint.
    Breakpoint {
        /// The stopped thread, with its instruction address rewound to the
        /// breakpoint address.
        thread: C::StoppedThread,
    },

    /// A thread has stopped by triggering a watchpoint.
    Watchpoint {
        /// The stopped thread.
        thread: C::StoppedThread,

        /// Address of the watched data.
        data_addr: u64,
    },

    /// A thread has stopped by completing a single-step.
    Singlestep {
        /// The stopped thread.
        thread: C::StoppedThread,
    },

    /// A thread has stopped by receiving a signal.
    Signal {
        /// The stopped thread.
        thread: C::StoppedThread,

        /// Number of the received signal.
        signum: i32,
    },

    /// The target has exited.
    Exited {
        /// Exit code of the target.
        exit_code: i32,
    },
}

/// Address-space layout information of the debug target.
#[derive(Clone, Copy, Debug)]
pub struct BinaryContext {
    /// Whether addresses are 8 bytes wide (4 bytes otherwise).
    pub is_big_container: bool,

    /// Whether the target is little-endian.
    pub is_little_endian: bool,
}

impl BinaryContext {
    /// Returns the address width, in bytes.
    pub const fn addr_len(&self) -> u64 {
        if self.is_big_container { 8 } else { 4 }
    }

    /// Encodes the given address into target-endianness bytes.
    pub fn encode_addr(&self, addr: u64) -> Vec<u8> {
        if self.is_big_container {
            if self.is_little_endian {
                addr.to_le_bytes().to_vec()
            } else {
                addr.to_be_bytes().to_vec()
            }
        } else if self.is_little_endian {
            (addr as u32).to_le_bytes().to_vec()
        } else {
            (addr as u32).to_be_bytes().to_vec()
        }
    }
}
