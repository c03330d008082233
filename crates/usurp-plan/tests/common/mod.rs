use std::collections::{BTreeSet, HashMap, VecDeque};

use usurp_plan::{CheckerRegistry, CheckerVerdict};
use usurp_target::{BinaryContext, ExecutionContext, RegisterState, ResumeScope};
use usurp_target::{StopEvent, Thread};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("memory write refused")]
    MemoryWriteRefused,

    #[error("breakpoint refused")]
    BreakpointRefused,

    #[error("register write refused")]
    RegisterWriteRefused,

    #[error("stop script exhausted")]
    ScriptExhausted,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MockRegisters {
    pub pc: u64,
    pub sp: u64,
    pub args: Vec<u64>,
    pub ret: u64,
}

impl RegisterState for MockRegisters {
    fn instr_addr(&self) -> u64 {
        self.pc
    }

    fn set_instr_addr(&mut self, addr: u64) {
        self.pc = addr;
    }

    fn stack_ptr(&self) -> u64 {
        self.sp
    }

    fn set_stack_ptr(&mut self, addr: u64) {
        self.sp = addr;
    }

    fn set_arguments(&mut self, args: &[u64]) {
        self.args = args.to_vec();
    }

    fn return_value(&self) -> u64 {
        self.ret
    }
}

#[derive(Debug)]
pub struct MockThread {
    pub id: u64,
    pub instr_addr: u64,
    pub single_step: bool,
}

impl MockThread {
    pub fn stopped_at(id: u64, instr_addr: u64) -> Self {
        Self {
            id,
            instr_addr,
            single_step: false,
        }
    }
}

impl Thread for MockThread {
    fn id(&self) -> u64 {
        self.id
    }

    fn instr_addr(&self) -> u64 {
        self.instr_addr
    }

    fn is_single_step(&self) -> bool {
        self.single_step
    }

    fn set_single_step(&mut self, enable: bool) {
        self.single_step = enable;
    }
}

/// One stop the mock target reports, with the register state the
/// stopping thread has at that point.
pub enum ScriptedStop {
    Breakpoint { tid: u64, regs: MockRegisters },
    Singlestep { tid: u64, regs: MockRegisters },
    Signal { tid: u64, regs: MockRegisters, signum: i32 },
    Exited { exit_code: i32 },
}

/// Scripted in-memory debug target.
///
/// Register state, memory, breakpoints and resume requests are plain
/// collections the tests can inspect; stop events are replayed from a
/// script.
pub struct MockContext {
    pub regs: HashMap<u64, MockRegisters>,
    pub memory: HashMap<u64, u8>,
    pub breakpoints: BTreeSet<u64>,
    pub script: VecDeque<ScriptedStop>,
    pub resumes: Vec<(u64, ResumeScope)>,
    pub single_step_resumes: Vec<bool>,
    pub set_registers_log: Vec<(u64, MockRegisters)>,
    pub fail_memory_writes: bool,
    pub fail_add_breakpoint: bool,
    pub fail_set_registers: bool,
}

impl MockContext {
    pub fn new() -> Self {
        Self {
            regs: HashMap::new(),
            memory: HashMap::new(),
            breakpoints: BTreeSet::new(),
            script: VecDeque::new(),
            resumes: Vec::new(),
            single_step_resumes: Vec::new(),
            set_registers_log: Vec::new(),
            fail_memory_writes: false,
            fail_add_breakpoint: false,
            fail_set_registers: false,
        }
    }

    pub fn with_thread(mut self, tid: u64, regs: MockRegisters) -> Self {
        self.regs.insert(tid, regs);
        self
    }

    pub fn push_stop(&mut self, stop: ScriptedStop) {
        self.script.push_back(stop);
    }

    pub fn mem_slice(&self, addr: u64, len: u64) -> Vec<u8> {
        (addr..addr + len)
            .map(|a| self.memory.get(&a).copied().unwrap_or_default())
            .collect()
    }
}

impl ExecutionContext for MockContext {
    type Registers = MockRegisters;
    type StoppedThread = MockThread;
    type Error = Error;

    async fn wait_stop(&mut self) -> Result<StopEvent<Self>, Self::Error> {
        let stop = self.script.pop_front().ok_or(Error::ScriptExhausted)?;

        Ok(match stop {
            ScriptedStop::Breakpoint { tid, regs } => {
                let instr_addr = regs.pc;
                self.regs.insert(tid, regs);

                StopEvent::Breakpoint {
                    thread: MockThread::stopped_at(tid, instr_addr),
                }
            }
            ScriptedStop::Singlestep { tid, regs } => {
                let instr_addr = regs.pc;
                self.regs.insert(tid, regs);

                StopEvent::Singlestep {
                    thread: MockThread::stopped_at(tid, instr_addr),
                }
            }
            ScriptedStop::Signal { tid, regs, signum } => {
                let instr_addr = regs.pc;
                self.regs.insert(tid, regs);

                StopEvent::Signal {
                    thread: MockThread::stopped_at(tid, instr_addr),
                    signum,
                }
            }
            ScriptedStop::Exited { exit_code } => StopEvent::Exited { exit_code },
        })
    }

    fn binary_ctx(&self) -> BinaryContext {
        BinaryContext {
            is_big_container: true,
            is_little_endian: true,
        }
    }

    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<(), Self::Error> {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.memory.get(&(addr + i as u64)).copied().unwrap_or(0);
        }

        Ok(())
    }

    fn write_memory(&mut self, addr: u64, buf: &[u8]) -> Result<(), Self::Error> {
        if self.fail_memory_writes {
            return Err(Error::MemoryWriteRefused);
        }

        for (i, byte) in buf.iter().enumerate() {
            self.memory.insert(addr + i as u64, *byte);
        }

        Ok(())
    }

    fn get_registers(
        &mut self,
        thread: &Self::StoppedThread,
    ) -> Result<Self::Registers, Self::Error> {
        Ok(self.regs.get(&thread.id).cloned().unwrap_or_default())
    }

    fn set_registers(
        &mut self,
        thread: &Self::StoppedThread,
        regs: Self::Registers,
    ) -> Result<(), Self::Error> {
        if self.fail_set_registers {
            return Err(Error::RegisterWriteRefused);
        }

        self.set_registers_log.push((thread.id, regs.clone()));
        self.regs.insert(thread.id, regs);

        Ok(())
    }

    fn add_breakpoint(&mut self, addr: u64) -> Result<(), Self::Error> {
        if self.fail_add_breakpoint {
            return Err(Error::BreakpointRefused);
        }

        self.breakpoints.insert(addr);

        Ok(())
    }

    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), Self::Error> {
        self.breakpoints.remove(&addr);

        Ok(())
    }

    fn resume(
        &mut self,
        thread: Self::StoppedThread,
        scope: ResumeScope,
    ) -> Result<(), Self::Error> {
        self.resumes.push((thread.id, scope));
        self.single_step_resumes.push(thread.single_step);

        Ok(())
    }
}

/// Checker registry flagging a fixed set of addresses.
pub struct FlaggingCheckers {
    pub flagged: HashMap<u64, String>,
}

impl CheckerRegistry for FlaggingCheckers {
    fn check_address(&self, addr: u64) -> CheckerVerdict {
        match self.flagged.get(&addr) {
            Some(description) => CheckerVerdict::violation(description.clone()),
            None => CheckerVerdict::valid(),
        }
    }
}
