//! TVM execution engine.
//!
//! Implements the fetch-decode-execute cycle, the instruction cache and
//! branch predictor bookkeeping, interrupt intake and every T3 opcode.

use log::{debug, trace, warn};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::config::TvmConfig;
use crate::ternary::{arith, gate_eval, Alu, Trit, Word};
use crate::tvm::decode::{self, mode, DecodeError, Instruction, Opcode};
use crate::tvm::icache::ICache;
use crate::tvm::memory::{MemoryError, TritMemory};
use crate::tvm::predictor::BranchPredictor;
use crate::tvm::registers::{Registers, R_STATUS, T3_REGISTER_COUNT};

/// Interrupt kinds accepted by [`Tvm::handle_interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptKind {
    /// Advisory; maskable.
    Timer,
    /// Advisory; maskable.
    Io,
    /// Sets the error flag.
    Memory,
    /// Halts the machine.
    System,
    /// Anything else sets the error flag.
    Other(i64),
}

impl InterruptKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => InterruptKind::Timer,
            1 => InterruptKind::Io,
            2 => InterruptKind::Memory,
            3 => InterruptKind::System,
            other => InterruptKind::Other(other),
        }
    }

    pub fn is_maskable(self) -> bool {
        matches!(self, InterruptKind::Timer | InterruptKind::Io)
    }
}

/// Performance counters. Monotone while the machine runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvmCounters {
    pub instructions_executed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub branch_predictions: u64,
    pub branch_mispredictions: u64,
    pub interrupts_taken: u64,
    pub interrupts_masked: u64,
}

/// What the caller of [`Tvm::step`] must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// An ordinary instruction completed.
    Executed,
    /// A `SYSCALL` completed its machine side; the status belongs in r0.
    Syscall,
    /// The machine halted.
    Halted,
}

/// A syscall host's answer to `SYSCALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostReply {
    pub status: Trit,
    /// Stop the run loop after this syscall (cooperative yield).
    pub yield_cpu: bool,
}

impl HostReply {
    pub fn status(status: Trit) -> Self {
        Self { status, yield_cpu: false }
    }

    pub fn yield_with(status: Trit) -> Self {
        Self { status, yield_cpu: true }
    }
}

/// Something that services `SYSCALL` for a running TVM.
///
/// The number is in r0, arguments in r1..=r6; a scalar result goes in r7.
pub trait SyscallHost {
    fn syscall(&mut self, vm: &mut Tvm) -> HostReply;
}

/// Control-flow outcome of one executed instruction.
enum Flow {
    Next,
    Jumped,
    Halt,
    Syscall,
}

/// The Ternary Virtual Machine.
#[derive(Clone, Serialize, Deserialize)]
pub struct Tvm {
    /// Register file.
    pub regs: Registers,
    /// Main memory.
    pub mem: TritMemory,
    running: bool,
    halted: bool,
    error: bool,
    interrupts_enabled: bool,
    icache: ICache,
    predictor: BranchPredictor,
    counters: TvmCounters,
    alu: Alu,
    #[serde(skip)]
    last_fault: Option<VmFault>,
}

impl Tvm {
    /// Create a machine from a configuration. SP starts at the top word.
    pub fn new(config: &TvmConfig) -> Self {
        let mut predictor = BranchPredictor::new(config.predictor_entries);
        predictor.set_enabled(config.branch_prediction);
        let mut vm = Self {
            regs: Registers::new(),
            mem: TritMemory::with_words(config.memory_words),
            running: false,
            halted: false,
            error: false,
            interrupts_enabled: true,
            icache: ICache::new(config.icache_size),
            predictor,
            counters: TvmCounters::default(),
            alu: Alu::new(),
            last_fault: None,
        };
        vm.regs.set_sp(config.memory_words as i64 - 1);
        vm
    }

    /// Create a machine with `memory_words` words and default caches.
    pub fn with_memory_words(memory_words: usize) -> Self {
        Self::new(&TvmConfig { memory_words, ..TvmConfig::default() })
    }

    /// Reset to the freshly created state, keeping sizes and predictor mode.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.reset();
        self.running = false;
        self.halted = false;
        self.error = false;
        self.interrupts_enabled = true;
        self.icache.flush();
        self.predictor.reset();
        self.counters = TvmCounters::default();
        self.alu.clear();
        self.last_fault = None;
        self.regs.set_sp(self.mem.words() as i64 - 1);
    }

    /// Load a program at word 0, set PC to 0 and make the machine runnable.
    pub fn load_program(&mut self, program: &[Word]) -> Result<(), MemoryError> {
        self.mem.load_program(0, program)?;
        self.icache.flush();
        self.regs.set_pc(0);
        self.halted = false;
        self.error = false;
        self.last_fault = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    pub fn counters(&self) -> &TvmCounters {
        &self.counters
    }

    pub fn alu(&self) -> &Alu {
        &self.alu
    }

    pub fn icache(&self) -> &ICache {
        &self.icache
    }

    pub fn predictor(&self) -> &BranchPredictor {
        &self.predictor
    }

    pub fn predictor_mut(&mut self) -> &mut BranchPredictor {
        &mut self.predictor
    }

    /// The fault that set the error flag, if any.
    pub fn last_fault(&self) -> Option<&VmFault> {
        self.last_fault.as_ref()
    }

    /// Clear a fault or halt so the machine may be resumed.
    pub fn resume(&mut self) {
        self.halted = false;
        self.error = false;
        self.last_fault = None;
    }

    /// Stop the machine with an execution fault.
    pub fn fault(&mut self, fault: VmFault) {
        warn!("tvm fault at pc={}: {}", self.regs.pc(), fault);
        self.error = true;
        self.running = false;
        self.last_fault = Some(fault);
    }

    fn halt(&mut self) {
        debug!("tvm halted at pc={} after {} instructions", self.regs.pc(), self.counters.instructions_executed);
        self.halted = true;
        self.running = false;
    }

    /// Take an interrupt between instructions.
    ///
    /// Timer and IO are advisory and dropped while masked by `CLI`.
    pub fn handle_interrupt(&mut self, kind: InterruptKind) {
        if kind.is_maskable() && !self.interrupts_enabled {
            self.counters.interrupts_masked += 1;
            return;
        }
        self.counters.interrupts_taken += 1;
        trace!("tvm interrupt {:?}", kind);
        match kind {
            InterruptKind::Timer | InterruptKind::Io => {}
            InterruptKind::Memory => self.fault(VmFault::Interrupt(2)),
            InterruptKind::System => self.halt(),
            InterruptKind::Other(code) => self.fault(VmFault::Interrupt(code)),
        }
    }

    /// Push PC and jump to `addr`, as `CALL` would. Used for signal handlers,
    /// which return with `RET`.
    pub fn enter_handler(&mut self, addr: i64) -> Result<(), VmFault> {
        let pc = self.regs.pc();
        self.push(Word::from_i64_saturating(pc))?;
        self.regs.set_pc(addr);
        Ok(())
    }

    /// Run with no syscall host: every `SYSCALL` fails with N in r0.
    ///
    /// Returns O after `HALT`, X after a fault.
    pub fn run(&mut self) -> Trit {
        self.run_loop(None, None)
    }

    /// Run with a syscall host. Returns P if the host asks to yield.
    pub fn run_with(&mut self, host: &mut dyn SyscallHost) -> Trit {
        self.run_loop(Some(host), None)
    }

    /// Run at most `budget` instructions. Returns P if the budget runs out.
    pub fn run_for(&mut self, budget: u64, host: Option<&mut dyn SyscallHost>) -> Trit {
        self.run_loop(host, Some(budget))
    }

    fn run_loop(&mut self, mut host: Option<&mut dyn SyscallHost>, budget: Option<u64>) -> Trit {
        if self.halted || self.error {
            return self.exit_status();
        }
        self.running = true;
        let mut executed = 0u64;

        while self.running && !self.halted && !self.error {
            if budget.is_some_and(|b| executed >= b) {
                self.running = false;
                return Trit::P;
            }
            executed += 1;

            match self.step() {
                Ok(StepEvent::Executed) | Ok(StepEvent::Halted) => {}
                Ok(StepEvent::Syscall) => {
                    let reply = match host.as_deref_mut() {
                        Some(h) => h.syscall(self),
                        None => HostReply::status(Trit::N),
                    };
                    self.regs.set_trit(R_STATUS, reply.status);
                    if reply.yield_cpu {
                        self.running = false;
                        return Trit::P;
                    }
                }
                Err(_) => break,
            }
        }

        self.running = false;
        self.exit_status()
    }

    fn exit_status(&self) -> Trit {
        if self.error {
            Trit::X
        } else if self.halted {
            Trit::O
        } else {
            Trit::P
        }
    }

    /// Execute exactly one instruction.
    ///
    /// A fault sets the error flag and is also returned.
    pub fn step(&mut self) -> Result<StepEvent, VmFault> {
        if self.halted || self.error {
            return Err(VmFault::NotRunning);
        }
        match self.step_inner() {
            Ok(event) => Ok(event),
            Err(fault) => {
                self.fault(fault.clone());
                Err(fault)
            }
        }
    }

    fn step_inner(&mut self) -> Result<StepEvent, VmFault> {
        // Fetch
        let pc_value = self.regs.pc();
        let pc = usize::try_from(pc_value)
            .ok()
            .filter(|&pc| pc < self.mem.words())
            .ok_or(VmFault::PcOutOfRange(pc_value))?;

        let instr = match self.icache.lookup(pc) {
            Some(instr) => {
                self.counters.cache_hits += 1;
                instr
            }
            None => {
                let word = self.mem.read_word(pc)?;
                let instr = decode::decode(word)?;
                self.icache.install(pc, instr);
                self.counters.cache_misses += 1;
                instr
            }
        };

        let predicted = instr
            .opcode
            .is_conditional_branch()
            .then(|| self.predictor.predict(pc));

        // Execute
        let flow = self.execute(instr, pc_value)?;

        if let Some(predicted) = predicted {
            let taken = matches!(flow, Flow::Jumped);
            self.counters.branch_predictions += 1;
            if predicted != taken {
                self.counters.branch_mispredictions += 1;
            }
            self.predictor.update(pc, taken);
        }

        self.counters.instructions_executed += 1;
        trace!("pc={:04} {:?}", pc, instr);

        Ok(match flow {
            Flow::Next => {
                self.regs.advance_pc();
                StepEvent::Executed
            }
            Flow::Jumped => StepEvent::Executed,
            Flow::Syscall => {
                self.regs.advance_pc();
                StepEvent::Syscall
            }
            Flow::Halt => {
                self.halt();
                StepEvent::Halted
            }
        })
    }

    fn reg_index(op: i8) -> Result<usize, VmFault> {
        usize::try_from(op)
            .ok()
            .filter(|&i| i < T3_REGISTER_COUNT)
            .ok_or(VmFault::InvalidRegister(op))
    }

    fn read_reg(&self, op: i8) -> Result<Word, VmFault> {
        let i = Self::reg_index(op)?;
        self.regs.get(i).ok_or(VmFault::InvalidRegister(op))
    }

    fn write_reg(&mut self, op: i8, value: Word) -> Result<(), VmFault> {
        let i = Self::reg_index(op)?;
        self.regs.set(i, value);
        Ok(())
    }

    fn write_trit(&mut self, op: i8, opcode: Opcode, value: Trit) -> Result<(), VmFault> {
        if !value.is_valid() {
            return Err(VmFault::InvalidOperand(opcode));
        }
        self.write_reg(op, Word::from_trit(value))
    }

    fn data_address(&self, base: i64, offset: i16) -> Result<usize, VmFault> {
        let addr = base + offset as i64;
        usize::try_from(addr)
            .ok()
            .filter(|&a| a < self.mem.words())
            .ok_or(VmFault::AddressOutOfRange(addr))
    }

    fn store_word(&mut self, addr: usize, value: Word) -> Result<(), VmFault> {
        self.mem.write_word(addr, value)?;
        self.icache.invalidate(addr);
        Ok(())
    }

    fn push(&mut self, value: Word) -> Result<(), VmFault> {
        let sp = self.regs.sp();
        let addr = usize::try_from(sp)
            .ok()
            .filter(|&a| a < self.mem.words())
            .ok_or(VmFault::StackOverflow(sp))?;
        self.store_word(addr, value)?;
        self.regs.set_sp(sp - 1);
        Ok(())
    }

    fn pop(&mut self) -> Result<Word, VmFault> {
        let sp = self.regs.sp() + 1;
        let addr = usize::try_from(sp)
            .ok()
            .filter(|&a| a < self.mem.words())
            .ok_or(VmFault::StackUnderflow(sp))?;
        let value = self.mem.read_word(addr)?;
        self.regs.set_sp(sp);
        Ok(value)
    }

    fn alu_binary(&mut self, instr: Instruction) -> Result<Flow, VmFault> {
        let a = self.read_reg(instr.op2)?.to_trit();
        let b = self.read_reg(instr.op3)?.to_trit();
        let result = match instr.opcode {
            Opcode::Add => self.alu.add(a, b),
            Opcode::Sub => self.alu.sub(a, b),
            Opcode::Mul => self.alu.mul(a, b),
            Opcode::Div => self.alu.div(a, b),
            Opcode::And => self.alu.and(a, b),
            Opcode::Or => self.alu.or(a, b),
            Opcode::Xor => self.alu.xor(a, b),
            _ => Trit::X,
        };
        self.write_trit(instr.op1, instr.opcode, result)?;
        Ok(Flow::Next)
    }

    fn jump(&mut self, target: i16) -> Flow {
        self.regs.set_pc(target as i64);
        Flow::Jumped
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction, pc: i64) -> Result<Flow, VmFault> {
        let flow = match instr.opcode {
            // ==================== Data Movement ====================

            Opcode::Load => {
                let value = match instr.op3 {
                    mode::PLAIN => Word::from_trit(Trit::saturate(instr.imm as i64).0),
                    mode::REGISTER => self.read_reg(instr.op2)?,
                    mode::MEMORY => {
                        let base = self.read_reg(instr.op2)?.to_i64();
                        let addr = self.data_address(base, instr.imm)?;
                        self.mem.read_word(addr)?
                    }
                    _ => return Err(VmFault::InvalidOperand(instr.opcode)),
                };
                self.write_reg(instr.op1, value)?;
                Flow::Next
            }

            Opcode::Store => {
                let value = self.read_reg(instr.op1)?;
                match instr.op3 {
                    mode::PLAIN | mode::REGISTER => self.write_reg(instr.op2, value)?,
                    mode::MEMORY => {
                        let base = self.read_reg(instr.op2)?.to_i64();
                        let addr = self.data_address(base, instr.imm)?;
                        self.store_word(addr, value)?;
                    }
                    _ => return Err(VmFault::InvalidOperand(instr.opcode)),
                }
                Flow::Next
            }

            Opcode::Mov => {
                let value = self.read_reg(instr.op2)?;
                self.write_reg(instr.op1, value)?;
                Flow::Next
            }

            Opcode::Lea => {
                let base = match instr.op3 {
                    mode::PLAIN => 0,
                    mode::REGISTER => self.read_reg(instr.op2)?.to_i64(),
                    _ => return Err(VmFault::InvalidOperand(instr.opcode)),
                };
                self.write_reg(instr.op1, Word::from_i64_saturating(base + instr.imm as i64))?;
                Flow::Next
            }

            // ==================== Arithmetic & Logic ====================

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div
            | Opcode::And | Opcode::Or | Opcode::Xor => self.alu_binary(instr)?,

            Opcode::Not => {
                let a = self.read_reg(instr.op2)?.to_trit();
                let result = self.alu.not(a);
                self.write_trit(instr.op1, instr.opcode, result)?;
                Flow::Next
            }

            // ==================== Comparison ====================

            Opcode::Cmp => {
                let a = self.read_reg(instr.op1)?;
                let b = self.read_reg(instr.op2)?;
                let equal = arith::compare(&a, &b).is_eq();
                self.regs.set_cr(Trit::from_bool(equal));
                Flow::Next
            }

            Opcode::Tst => {
                let a = self.read_reg(instr.op1)?;
                self.regs.set_cr(a.sign());
                Flow::Next
            }

            // ==================== Control Flow ====================

            Opcode::Jmp => self.jump(instr.imm),

            Opcode::Jz => {
                if self.read_reg(instr.op1)?.is_zero() {
                    self.jump(instr.imm)
                } else {
                    Flow::Next
                }
            }

            Opcode::Jnz => {
                if !self.read_reg(instr.op1)?.is_zero() {
                    self.jump(instr.imm)
                } else {
                    Flow::Next
                }
            }

            Opcode::Call => {
                self.push(Word::from_i64_saturating(pc + 1))?;
                self.jump(instr.imm)
            }

            Opcode::Ret => {
                let target = self.pop()?;
                self.regs.set_pc(target.to_i64());
                Flow::Jumped
            }

            // ==================== Stack ====================

            Opcode::Push => {
                let value = self.read_reg(instr.op1)?;
                self.push(value)?;
                Flow::Next
            }

            Opcode::Pop => {
                Self::reg_index(instr.op1)?;
                let value = self.pop()?;
                self.write_reg(instr.op1, value)?;
                Flow::Next
            }

            // ==================== System ====================

            Opcode::Halt => Flow::Halt,

            Opcode::Nop => Flow::Next,

            Opcode::Syscall => {
                self.regs.set_lr(pc + 1);
                Flow::Syscall
            }

            Opcode::Iret => {
                let target = self.regs.lr();
                self.regs.set_pc(target);
                Flow::Jumped
            }

            Opcode::Cli => {
                self.interrupts_enabled = false;
                Flow::Next
            }

            Opcode::Sti => {
                self.interrupts_enabled = true;
                Flow::Next
            }

            Opcode::Int => {
                self.handle_interrupt(InterruptKind::from_code(instr.imm as i64));
                if self.error {
                    // The interrupt already recorded the fault
                    return Err(self.last_fault.clone().unwrap_or(VmFault::Interrupt(instr.imm as i64)));
                }
                if self.halted { Flow::Halt } else { Flow::Next }
            }

            // ==================== Introspection ====================

            Opcode::Cpuid => {
                let value = match instr.imm {
                    0 => Word::WIDTH as i64,
                    1 => T3_REGISTER_COUNT as i64,
                    2 => self.icache.size() as i64,
                    3 => self.mem.words() as i64,
                    4 => self.predictor.entries() as i64,
                    _ => 0,
                };
                self.write_reg(instr.op1, Word::from_i64_saturating(value))?;
                Flow::Next
            }

            Opcode::Rdtsc => {
                let ticks = self.counters.instructions_executed as i64;
                self.write_reg(instr.op1, Word::from_i64_saturating(ticks))?;
                Flow::Next
            }

            // ==================== Ternary Gate ====================

            Opcode::Tgate => {
                let a = self.read_reg(instr.op2)?.to_trit();
                let b = self.read_reg(instr.op3)?.to_trit();
                let result = gate_eval(instr.imm as i64, a, b);
                self.write_trit(instr.op1, instr.opcode, result)?;
                Flow::Next
            }
        };

        Ok(flow)
    }
}

impl Default for Tvm {
    fn default() -> Self {
        Self::new(&TvmConfig::default())
    }
}

impl std::fmt::Debug for Tvm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tvm")
            .field("running", &self.running)
            .field("halted", &self.halted)
            .field("error", &self.error)
            .field("pc", &self.regs.pc())
            .field("counters", &self.counters)
            .finish()
    }
}

/// Execution faults. Any of these sets the TVM error flag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmFault {
    #[error("machine is not running")]
    NotRunning,

    #[error("program counter {0} out of range")]
    PcOutOfRange(i64),

    #[error("register index {0} not allowed")]
    InvalidRegister(i8),

    #[error("{0} produced an invalid result")]
    InvalidOperand(Opcode),

    #[error("data address {0} out of range")]
    AddressOutOfRange(i64),

    #[error("stack overflow at sp={0}")]
    StackOverflow(i64),

    #[error("stack underflow at sp={0}")]
    StackUnderflow(i64),

    #[error("fatal interrupt {0}")]
    Interrupt(i64),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::decode::encode;
    use crate::tvm::registers::{CR, LR, R_RESULT};
    use proptest::prelude::*;

    fn make_program(instructions: &[Instruction]) -> Vec<Word> {
        instructions.iter().map(encode).collect()
    }

    fn vm_with(instructions: &[Instruction]) -> Tvm {
        let mut vm = Tvm::with_memory_words(64);
        vm.load_program(&make_program(instructions)).unwrap();
        vm
    }

    #[test]
    fn test_add_program() {
        let mut vm = Tvm::with_memory_words(128);
        vm.load_program(&make_program(&[
            Instruction::load_imm(0, 1),
            Instruction::load_imm(1, 1),
            Instruction::rrr(Opcode::Add, 2, 0, 1),
            Instruction::halt(),
        ]))
        .unwrap();
        vm.regs.set_pc(0);
        vm.regs.set_sp(127);

        assert_eq!(vm.run(), Trit::O);
        assert!(vm.is_halted());
        assert!(!vm.has_error());
        assert!(!vm.is_running());
        assert_eq!(vm.regs.get(2).map(|w| w.to_trit()), Some(Trit::P));
        assert_eq!(vm.counters().instructions_executed, 4);
        assert!(vm.alu().flags.overflow);
    }

    #[test]
    fn test_load_saturates_immediate() {
        let mut vm = vm_with(&[Instruction::load_imm(3, -500), Instruction::lea(4, -500), Instruction::halt()]);
        vm.run();
        assert_eq!(vm.regs.value(3), -1);
        assert_eq!(vm.regs.value(4), -500);
    }

    #[test]
    fn test_bad_register_faults() {
        let mut vm = vm_with(&[Instruction::rrr(Opcode::Add, 16, 0, 1), Instruction::halt()]);
        assert_eq!(vm.run(), Trit::X);
        assert!(vm.has_error());
        assert!(!vm.is_running());
        assert_eq!(vm.last_fault(), Some(&VmFault::InvalidRegister(16)));
        assert_eq!(vm.counters().instructions_executed, 0);
    }

    #[test]
    fn test_div_by_zero_faults() {
        let mut vm = vm_with(&[
            Instruction::load_imm(0, 1),
            Instruction::rrr(Opcode::Div, 2, 0, 1),
            Instruction::halt(),
        ]);
        assert_eq!(vm.run(), Trit::X);
        assert_eq!(vm.last_fault(), Some(&VmFault::InvalidOperand(Opcode::Div)));
    }

    #[test]
    fn test_pc_out_of_range() {
        let mut vm = vm_with(&[Instruction::imm(Opcode::Jmp, 1000)]);
        assert_eq!(vm.run(), Trit::X);
        assert_eq!(vm.last_fault(), Some(&VmFault::PcOutOfRange(1000)));
    }

    #[test]
    fn test_call_ret_and_stack() {
        let mut vm = vm_with(&[
            Instruction::imm(Opcode::Call, 3),      // 0
            Instruction::load_imm(1, 1),            // 1
            Instruction::halt(),                    // 2
            Instruction::lea(5, 42),                // 3
            Instruction::r(Opcode::Push, 5),        // 4
            Instruction::r(Opcode::Pop, 6),         // 5
            Instruction::bare(Opcode::Ret),         // 6
        ]);
        assert_eq!(vm.run(), Trit::O);
        assert_eq!(vm.regs.value(6), 42);
        assert_eq!(vm.regs.value(1), 1);
        assert_eq!(vm.regs.sp(), 63);
    }

    #[test]
    fn test_memory_load_store() {
        let mut vm = vm_with(&[
            Instruction::lea(1, 40),
            Instruction::lea(2, 777),
            Instruction::new(Opcode::Store, 2, 1, mode::MEMORY, 2),
            Instruction::new(Opcode::Load, 3, 1, mode::MEMORY, 2),
            Instruction::halt(),
        ]);
        vm.run();
        assert_eq!(vm.regs.value(3), 777);
        assert_eq!(vm.mem.read_word(42).map(|w| w.to_i64()), Ok(777));
    }

    #[test]
    fn test_loop_with_branch_prediction() {
        // r1 counts 0..5; JZ on CR loops back while r1 != r2
        let mut vm = vm_with(&[
            Instruction::lea(2, 5),                                      // 0
            Instruction::new(Opcode::Lea, 1, 1, mode::REGISTER, 1),      // 1
            Instruction::new(Opcode::Cmp, 1, 2, 0, 0),                   // 2
            Instruction::ri(Opcode::Jz, CR as u8, 1),                    // 3
            Instruction::halt(),                                         // 4
        ]);
        assert_eq!(vm.run(), Trit::O);
        assert_eq!(vm.regs.value(1), 5);
        let c = vm.counters();
        assert_eq!(c.branch_predictions, 5);
        assert!(c.branch_mispredictions >= 1);
        assert!(c.cache_hits > 0);
        assert_eq!(c.cache_misses, 5);
        assert!(vm.icache().is_consistent());
    }

    #[test]
    fn test_syscall_without_host_fails() {
        let mut vm = vm_with(&[Instruction::bare(Opcode::Syscall), Instruction::halt()]);
        assert_eq!(vm.run(), Trit::O);
        assert_eq!(vm.regs.get(R_STATUS).map(|w| w.to_trit()), Some(Trit::N));
        assert_eq!(vm.regs.value(LR), 1);
    }

    struct YieldingHost {
        calls: u32,
    }

    impl SyscallHost for YieldingHost {
        fn syscall(&mut self, vm: &mut Tvm) -> HostReply {
            self.calls += 1;
            vm.regs.set_value(R_RESULT, 99);
            HostReply::yield_with(Trit::P)
        }
    }

    #[test]
    fn test_host_yield_returns_positive() {
        let mut vm = vm_with(&[Instruction::bare(Opcode::Syscall), Instruction::halt()]);
        let mut host = YieldingHost { calls: 0 };
        assert_eq!(vm.run_with(&mut host), Trit::P);
        assert_eq!(host.calls, 1);
        assert_eq!(vm.regs.value(R_RESULT), 99);
        assert_eq!(vm.regs.get(R_STATUS).map(|w| w.to_trit()), Some(Trit::P));
        // resume where it left off
        assert_eq!(vm.run_with(&mut host), Trit::O);
    }

    #[test]
    fn test_budget_yields() {
        let mut vm = vm_with(&[Instruction::imm(Opcode::Jmp, 0)]);
        assert_eq!(vm.run_for(10, None), Trit::P);
        assert_eq!(vm.counters().instructions_executed, 10);
        assert!(!vm.is_running());
    }

    #[test]
    fn test_interrupts() {
        let mut vm = vm_with(&[
            Instruction::bare(Opcode::Cli),
            Instruction::imm(Opcode::Int, 0),
            Instruction::bare(Opcode::Sti),
            Instruction::imm(Opcode::Int, 3),
            Instruction::bare(Opcode::Nop),
        ]);
        assert_eq!(vm.run(), Trit::O);
        assert_eq!(vm.counters().interrupts_masked, 1);
        assert_eq!(vm.counters().instructions_executed, 4);

        let mut vm = vm_with(&[Instruction::imm(Opcode::Int, 2)]);
        assert_eq!(vm.run(), Trit::X);

        let mut vm = vm_with(&[Instruction::imm(Opcode::Int, 9)]);
        assert_eq!(vm.run(), Trit::X);
        assert_eq!(vm.last_fault(), Some(&VmFault::Interrupt(9)));
    }

    #[test]
    fn test_tgate_and_cpuid() {
        let mut vm = vm_with(&[
            Instruction::load_imm(0, 1),
            Instruction::load_imm(1, -1),
            Instruction::new(Opcode::Tgate, 2, 0, 1, 0),
            Instruction::ri(Opcode::Cpuid, 3, 0),
            Instruction::r(Opcode::Rdtsc, 4),
            Instruction::halt(),
        ]);
        vm.run();
        assert_eq!(vm.regs.value(2), -1);
        assert_eq!(vm.regs.value(3), 27);
        assert_eq!(vm.regs.value(4), 4);
    }

    fn arb_instruction() -> impl Strategy<Value = Instruction> {
        let reg = 0u8..12;
        prop_oneof![
            (reg.clone(), -2i16..=2).prop_map(|(r, i)| Instruction::load_imm(r, i)),
            (reg.clone(), 0i16..20).prop_map(|(r, i)| Instruction::lea(r, i)),
            (prop::sample::select(vec![Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::And, Opcode::Or, Opcode::Xor]),
             reg.clone(), reg.clone(), reg.clone())
                .prop_map(|(op, d, a, b)| Instruction::rrr(op, d, a, b)),
            (reg.clone(), 0i16..16).prop_map(|(r, t)| Instruction::ri(Opcode::Jz, r, t)),
            (reg.clone(), 0i16..16).prop_map(|(r, t)| Instruction::ri(Opcode::Jnz, r, t)),
            reg.clone().prop_map(|r| Instruction::r(Opcode::Push, r)),
            reg.prop_map(|r| Instruction::r(Opcode::Pop, r)),
            Just(Instruction::halt()),
        ]
    }

    fn architectural(vm: &Tvm) -> (Registers, TritMemory, bool, bool, u64) {
        (vm.regs.clone(), vm.mem.clone(), vm.is_halted(), vm.has_error(), vm.counters().instructions_executed)
    }

    proptest! {
        #[test]
        fn prop_execution_is_deterministic(program in prop::collection::vec(arb_instruction(), 1..16)) {
            let words = make_program(&program);
            let mut a = Tvm::with_memory_words(32);
            let mut b = Tvm::with_memory_words(32);
            a.load_program(&words).unwrap();
            b.load_program(&words).unwrap();
            a.run_for(500, None);
            b.run_for(500, None);
            prop_assert_eq!(architectural(&a), architectural(&b));
            prop_assert_eq!(a.counters(), b.counters());
        }

        #[test]
        fn prop_predictor_is_only_a_hint(program in prop::collection::vec(arb_instruction(), 1..16)) {
            let words = make_program(&program);
            let mut with = Tvm::with_memory_words(32);
            let mut without = Tvm::with_memory_words(32);
            without.predictor_mut().set_enabled(false);
            with.load_program(&words).unwrap();
            without.load_program(&words).unwrap();
            with.run_for(500, None);
            without.run_for(500, None);
            prop_assert_eq!(architectural(&with), architectural(&without));
        }
    }
}
