//! This crate provides the traits through which the execution-control core
//! (`usurp-plan`) talks to a live debug target.
//!
//! It deliberately contains *interfaces only*: how registers and memory are
//! physically accessed, how breakpoints are inserted, and how stop events
//! are fetched from the target is left to the implementor (a local
//! `ptrace`-style debugger, a remote-protocol client, a VM introspection
//! layer, or a scripted fake for testing).
//!
//! The central trait is [ExecutionContext]: one value per debugged process,
//! exposing per-thread register access, memory access, breakpoint control
//! and an asynchronous stop-event wait. The plan machinery never polls; it
//! suspends on [ExecutionContext::wait_stop] until the target reports the
//! next stop.

mod context;
mod registers;
mod thread;

pub use self::context::{BinaryContext, ExecutionContext, ResumeScope, StopEvent};
pub use self::registers::RegisterState;
pub use self::thread::Thread;
