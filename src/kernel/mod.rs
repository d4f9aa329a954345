//! The kernel context and the bridge between processes and their TVMs.
//!
//! All kernel state lives in one [`Kernel`] value: process table,
//! scheduler, syscall table, frame allocator, physical memory, pipes and
//! console. Every operation takes it explicitly.

pub mod console;
pub mod mm;
pub mod signal;
pub mod fd;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod handlers;

use std::collections::BTreeMap;
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, KernelConfig};
use crate::ternary::Word;
use crate::tvm::registers::{R_ARG0, R_STATUS};
use crate::tvm::{MemoryError, StepEvent};

pub use console::{BufferConsole, Console, StdoutConsole};
pub use fd::{FdEntry, FdTable, PipeTable};
pub use mm::{BitmapAllocator, FrameAllocator, MmError, PhysMemory, Region};
pub use process::{Pcb, Pid, ProcessError, ProcessState, KERNEL_PID};
pub use sched::Scheduler;
pub use signal::{Signal, SignalAction, SignalState};
pub use syscall::{nr, SyscallArgs, SyscallEntry, SyscallError, SyscallTable, MAX_SYSCALLS};

/// Kernel-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KernelStats {
    pub total_syscalls: u64,
    pub failed_syscalls: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub processes_created: u64,
    pub processes_destroyed: u64,
    pub signals_delivered: u64,
}

/// One row of the process table, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Option<Pid>,
    pub name: String,
    pub state: String,
    pub priority: i8,
    pub terminated: bool,
    pub exit_code: u32,
    pub ticks: u64,
    pub instructions: u64,
}

pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) processes: BTreeMap<Pid, Pcb>,
    pub(crate) next_pid: Pid,
    pub(crate) sched: Scheduler,
    pub(crate) syscalls: SyscallTable,
    pub(crate) frames: Box<dyn FrameAllocator>,
    pub(crate) phys: PhysMemory,
    pub(crate) pipes: PipeTable,
    pub(crate) console: Box<dyn Console>,
    pub(crate) stats: KernelStats,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("processes", &self.processes.len())
            .field("current", &self.sched.current)
            .field("ticks", &self.sched.ticks)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Kernel {
    /// Boot with a bitmap frame allocator sized from the configuration.
    pub fn boot(config: KernelConfig, console: Box<dyn Console>) -> Result<Self, KernelError> {
        let frames = Box::new(BitmapAllocator::new(config.frames, config.frame_size));
        Self::boot_with(config, frames, console)
    }

    /// Boot with a caller-supplied frame allocator.
    ///
    /// Creates the kernel process (pid 0), makes it current and installs
    /// the default syscalls.
    pub fn boot_with(
        config: KernelConfig,
        frames: Box<dyn FrameAllocator>,
        console: Box<dyn Console>,
    ) -> Result<Self, KernelError> {
        config.validate()?;
        let phys = PhysMemory::new(config.frames * config.frame_size);
        let mut kernel = Self {
            sched: Scheduler::new(config.quantum),
            config,
            processes: BTreeMap::new(),
            next_pid: KERNEL_PID,
            syscalls: SyscallTable::new(),
            frames,
            phys,
            pipes: PipeTable::new(),
            console,
            stats: KernelStats::default(),
        };

        let pid = kernel.create_process("kernel", None)?;
        kernel.pcb_mut(pid)?.state = ProcessState::Running;
        kernel.sched.current = Some(pid);
        handlers::register_default_syscalls(&mut kernel)?;
        info!(
            "kernel booted: {} frames of {} bytes, quantum {}",
            kernel.config.frames, kernel.config.frame_size, kernel.config.quantum
        );
        Ok(kernel)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn stats(&self) -> &KernelStats {
        &self.stats
    }

    pub fn frames(&self) -> &dyn FrameAllocator {
        self.frames.as_ref()
    }

    pub fn phys(&self) -> &PhysMemory {
        &self.phys
    }

    pub fn phys_mut(&mut self) -> &mut PhysMemory {
        &mut self.phys
    }

    pub fn pipes(&self) -> &PipeTable {
        &self.pipes
    }

    /// Snapshot of the process table in pid order.
    pub fn ps(&self) -> Vec<ProcessInfo> {
        self.processes
            .values()
            .map(|p| ProcessInfo {
                pid: p.pid,
                ppid: p.ppid,
                name: p.name.clone(),
                state: p.state.to_string(),
                priority: p.priority.to_i8().unwrap_or(0),
                terminated: p.terminated,
                exit_code: p.exit_code,
                ticks: p.ticks_total,
                instructions: p.tvm.counters().instructions_executed,
            })
            .collect()
    }

    // ==================== Programs ====================

    /// Create a process under `parent` running `program`.
    ///
    /// The name is staged as argv[0] at the bottom of the user stack; the
    /// program finds its address in r1 and its length in r2.
    pub fn spawn(&mut self, name: &str, program: &[Word], parent: Pid) -> Result<Pid, KernelError> {
        let pid = self.create_process(name, Some(parent))?;
        let user_stack = self.pcb(pid)?.user_stack;
        let room = user_stack.len(self.frames.frame_size());

        let loaded = self.pcb_mut(pid)?.tvm.load_program(program);
        if let Err(e) = loaded {
            self.pcb_mut(pid)?.terminated = true;
            self.destroy_process(pid)?;
            return Err(e.into());
        }
        if name.len() <= room {
            self.phys.write(user_stack.addr, name.as_bytes())?;
        }

        let p = self.pcb_mut(pid)?;
        p.tvm.regs.set_value(R_ARG0, user_stack.addr as i64);
        p.tvm.regs.set_value(R_ARG0 + 1, name.len() as i64);
        p.has_program = true;
        debug!("spawned '{}' as {} ({} words)", name, pid, program.len());
        Ok(pid)
    }

    /// Run the current process's program for up to one tick's worth of
    /// instructions, servicing its syscalls.
    pub fn run_slice(&mut self) {
        let Some(pid) = self.sched.current else { return };
        if pid == KERNEL_PID {
            return;
        }
        for _ in 0..self.config.instructions_per_tick {
            if self.sched.current != Some(pid) {
                break;
            }
            let Some(p) = self.processes.get_mut(&pid) else { break };
            if !p.has_program || p.terminated {
                break;
            }
            match p.tvm.step() {
                Ok(StepEvent::Executed) => {}
                Ok(StepEvent::Syscall) => self.service_tvm_syscall(pid),
                Ok(StepEvent::Halted) => {
                    if let Err(e) = self.exit_process(pid, 0) {
                        debug!("exit after halt: {}", e);
                    }
                    break;
                }
                Err(fault) => {
                    if let Err(e) = self.terminate_on_fault(pid, &fault) {
                        debug!("fault exit: {}", e);
                    }
                    break;
                }
            }
        }
    }

    /// Trap from a TVM: number in r0, arguments in r1..=r6. The status
    /// goes back to r0 and the scalar result to r7.
    fn service_tvm_syscall(&mut self, pid: Pid) {
        let Some(p) = self.processes.get(&pid) else { return };
        let regs = &p.tvm.regs;
        let num = regs.value(R_STATUS);
        let mut args = [0i64; 6];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = regs.value(R_ARG0 + i);
        }

        let status = self.dispatch_from(pid, num, args);
        if let Some(p) = self.processes.get_mut(&pid) {
            if !p.terminated {
                let value = p.context.retval;
                p.set_tvm_result(status, value);
            }
        }
    }

    /// Alternate program slices and timer ticks.
    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.run_slice();
            self.tick();
        }
    }

    /// Run until no live user process remains or `max_ticks` pass.
    /// Returns the ticks run.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> u64 {
        let mut ran = 0;
        while ran < max_ticks && self.has_live_user_process() {
            self.run_slice();
            self.tick();
            ran += 1;
        }
        ran
    }

    pub fn has_live_user_process(&self) -> bool {
        self.processes.values().any(|p| !p.is_kernel() && !p.terminated)
    }
}

/// Errors surfaced by kernel setup and program loading.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Syscall(#[from] SyscallError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Mm(#[from] MmError),
}
