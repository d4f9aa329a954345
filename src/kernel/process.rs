//! Process control blocks and process lifetime.
//!
//! Parent/child links are pids looked up in the process table, never
//! owning pointers. A terminated process stays in the table (state
//! `Blocked`) until its parent collects the exit code.

use std::collections::BTreeMap;
use std::fmt;
use log::{debug, info, warn};
use thiserror::Error;
use crate::kernel::fd::FdTable;
use crate::kernel::mm::{FrameAllocator, Region};
use crate::kernel::signal::{self, SignalState, SIGCHLD, SIGILL, SIGSEGV};
use crate::kernel::Kernel;
use crate::lambda::TermRef;
use crate::ternary::Trit;
use crate::tvm::registers::{R_RESULT, R_STATUS};
use crate::tvm::{Tvm, VmFault};

pub type Pid = u32;

/// The kernel (idle) process.
pub const KERNEL_PID: Pid = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
}

impl ProcessState {
    pub fn can_transition(self, to: ProcessState) -> bool {
        use ProcessState::*;
        matches!((self, to), (Ready, Running) | (Running, Ready) | (Running, Blocked) | (Blocked, Ready))
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Blocked => "BLOCKED",
        };
        f.write_str(s)
    }
}

/// Which child a blocked `wait` is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Any,
    Child(Pid),
}

impl WaitTarget {
    pub fn matches(self, pid: Pid) -> bool {
        match self {
            WaitTarget::Any => true,
            WaitTarget::Child(p) => p == pid,
        }
    }
}

/// Saved user-visible context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    /// Scalar result of the last syscall.
    pub retval: i64,
}

/// Lambda terms a process holds, by handle.
#[derive(Debug, Clone, Default)]
pub struct TermTable {
    terms: BTreeMap<u32, TermRef>,
    next: u32,
}

impl TermTable {
    pub fn insert(&mut self, t: TermRef) -> u32 {
        self.next += 1;
        self.terms.insert(self.next, t);
        self.next
    }

    pub fn get(&self, handle: i64) -> Option<TermRef> {
        u32::try_from(handle).ok().and_then(|h| self.terms.get(&h).cloned())
    }

    pub fn remove(&mut self, handle: i64) -> Option<TermRef> {
        u32::try_from(handle).ok().and_then(|h| self.terms.remove(&h))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }
}

/// Process control block.
#[derive(Debug)]
pub struct Pcb {
    pub pid: Pid,
    /// `None` only for the kernel process.
    pub ppid: Option<Pid>,
    pub name: String,
    pub state: ProcessState,
    /// Always one of N, O, P.
    pub priority: Trit,
    pub terminated: bool,
    pub exit_code: u32,
    pub kernel_stack: Region,
    pub user_stack: Region,
    pub heap: Option<Region>,
    pub argv: Vec<String>,
    pub tvm: Box<Tvm>,
    /// Whether the TVM holds a program to run.
    pub has_program: bool,
    pub context: Context,
    pub ticks_total: u64,
    pub ticks_recent: u64,
    pub sleep_until: Option<u64>,
    pub waiting_for: Option<WaitTarget>,
    pub signals: SignalState,
    pub fds: FdTable,
    pub terms: TermTable,
    pub children: Vec<Pid>,
}

impl Pcb {
    pub fn is_kernel(&self) -> bool {
        self.pid == KERNEL_PID
    }

    /// Report a syscall outcome to the process's program.
    pub fn set_tvm_result(&mut self, status: Trit, value: i64) {
        self.context.retval = value;
        self.tvm.regs.set_trit(R_STATUS, status);
        self.tvm.regs.set_value(R_RESULT, value);
    }
}

/// Clamp any integer priority into {N, O, P}.
pub fn clamp_priority(p: i64) -> Trit {
    Trit::saturate(p).0
}

impl Kernel {
    /// Create a process. It starts READY and queued (except the kernel process).
    ///
    /// On failure nothing stays allocated.
    pub fn create_process(&mut self, name: &str, parent: Option<Pid>) -> Result<Pid, ProcessError> {
        if self.processes.len() >= self.config.max_processes {
            warn!("process table full, cannot create '{}'", name);
            return Err(ProcessError::TableFull);
        }
        if let Some(ppid) = parent {
            if !self.processes.contains_key(&ppid) {
                return Err(ProcessError::NoSuchProcess(ppid));
            }
        }

        let kpages = self.config.kernel_stack_pages;
        let upages = self.config.user_stack_pages;
        let kstack = self.frames.alloc_pages(kpages).ok_or(ProcessError::OutOfMemory)?;
        let Some(ustack) = self.frames.alloc_pages(upages) else {
            self.frames.free_pages(kstack, kpages);
            return Err(ProcessError::OutOfMemory);
        };

        let pid = self.next_pid;
        self.next_pid += 1;

        let pcb = Pcb {
            pid,
            ppid: parent,
            name: name.to_string(),
            state: ProcessState::Ready,
            priority: Trit::O,
            terminated: false,
            exit_code: 0,
            kernel_stack: Region { addr: kstack, pages: kpages },
            user_stack: Region { addr: ustack, pages: upages },
            heap: None,
            argv: vec![name.to_string()],
            tvm: Box::new(Tvm::new(&self.config.tvm)),
            has_program: false,
            context: Context::default(),
            ticks_total: 0,
            ticks_recent: 0,
            sleep_until: None,
            waiting_for: None,
            signals: SignalState::default(),
            fds: FdTable::new(),
            terms: TermTable::default(),
            children: Vec::new(),
        };
        self.processes.insert(pid, pcb);

        if let Some(ppid) = parent {
            if let Some(p) = self.processes.get_mut(&ppid) {
                p.children.push(pid);
            }
        }
        if pid != KERNEL_PID {
            self.sched.enqueue(pid, Trit::O);
        }
        self.stats.processes_created += 1;
        info!("created process {} '{}' (parent {:?})", pid, name, parent);
        Ok(pid)
    }

    pub fn process(&self, pid: Pid) -> Option<&Pcb> {
        self.processes.get(&pid)
    }

    pub fn process_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.processes.get_mut(&pid)
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.processes.keys().copied().collect()
    }

    pub fn processes(&self) -> impl Iterator<Item = &Pcb> {
        self.processes.values()
    }

    pub(crate) fn pcb(&self, pid: Pid) -> Result<&Pcb, ProcessError> {
        self.processes.get(&pid).ok_or(ProcessError::NoSuchProcess(pid))
    }

    pub(crate) fn pcb_mut(&mut self, pid: Pid) -> Result<&mut Pcb, ProcessError> {
        self.processes.get_mut(&pid).ok_or(ProcessError::NoSuchProcess(pid))
    }

    /// Move a process along a legal state edge.
    pub fn transition(&mut self, pid: Pid, to: ProcessState) -> Result<(), ProcessError> {
        let pcb = self.pcb_mut(pid)?;
        let from = pcb.state;
        if !from.can_transition(to) {
            return Err(ProcessError::InvalidTransition { pid, from, to });
        }
        pcb.state = to;
        Ok(())
    }

    /// Terminate a process with `code`.
    ///
    /// Its descriptors are closed now; the PCB stays until the parent
    /// collects it. A waiting parent is completed immediately, and
    /// children of the kernel process are reaped at once.
    pub fn exit_process(&mut self, pid: Pid, code: u32) -> Result<(), ProcessError> {
        if pid == KERNEL_PID {
            return Err(ProcessError::KernelProcess);
        }
        let was_current = self.sched.current == Some(pid);
        let pcb = self.pcb_mut(pid)?;
        if pcb.terminated {
            return Ok(());
        }
        pcb.terminated = true;
        pcb.exit_code = code;
        pcb.state = ProcessState::Blocked;
        pcb.sleep_until = None;
        pcb.waiting_for = None;
        pcb.has_program = false;
        let fds = pcb.fds.drain();
        let children = std::mem::take(&mut pcb.children);
        let ppid = pcb.ppid;
        info!("process {} exited with {}", pid, code);

        self.sched.remove(pid);
        if was_current {
            self.sched.current = None;
        }
        for entry in fds {
            self.pipes.drop_ref(entry);
        }

        // Orphans go to the kernel process, which reaps the dead ones
        for child in children {
            let zombie = match self.processes.get_mut(&child) {
                Some(c) => {
                    c.ppid = Some(KERNEL_PID);
                    c.terminated
                }
                None => continue,
            };
            if zombie {
                self.destroy_process(child)?;
            } else if let Some(k) = self.processes.get_mut(&KERNEL_PID) {
                k.children.push(child);
            }
        }

        match ppid {
            Some(KERNEL_PID) | None => self.destroy_process(pid)?,
            Some(parent) => {
                let waiting = self
                    .processes
                    .get(&parent)
                    .and_then(|p| p.waiting_for)
                    .is_some_and(|w| w.matches(pid));
                if waiting {
                    self.complete_wait(parent, pid, code)?;
                } else {
                    self.send_signal(parent, SIGCHLD);
                }
            }
        }

        if was_current {
            self.schedule();
        }
        Ok(())
    }

    /// Hand a dead child's exit code to its blocked parent and reap the child.
    fn complete_wait(&mut self, parent: Pid, child: Pid, code: u32) -> Result<(), ProcessError> {
        self.destroy_process(child)?;
        let p = self.pcb_mut(parent)?;
        p.waiting_for = None;
        p.set_tvm_result(Trit::P, code as i64);
        debug!("process {} collected child {} (code {})", parent, child, code);
        self.unblock(parent)
    }

    /// Collect a terminated child of `parent` matching `target`, if any.
    /// Returns `(child, exit_code)`.
    pub(crate) fn reap_child(&mut self, parent: Pid, target: WaitTarget) -> Result<Option<(Pid, u32)>, ProcessError> {
        let found = self.pcb(parent)?.children.iter().copied().find(|c| {
            target.matches(*c) && self.processes.get(c).is_some_and(|p| p.terminated)
        });
        let Some(child) = found else { return Ok(None) };
        let code = self.pcb(child)?.exit_code;
        self.destroy_process(child)?;
        Ok(Some((child, code)))
    }

    /// Release everything a terminated process owns and drop its PCB.
    pub fn destroy_process(&mut self, pid: Pid) -> Result<(), ProcessError> {
        let pcb = self.pcb(pid)?;
        if !pcb.terminated {
            return Err(ProcessError::NotTerminated(pid));
        }
        let Some(mut pcb) = self.processes.remove(&pid) else {
            return Err(ProcessError::NoSuchProcess(pid));
        };

        self.frames.free_pages(pcb.kernel_stack.addr, pcb.kernel_stack.pages);
        self.frames.free_pages(pcb.user_stack.addr, pcb.user_stack.pages);
        if let Some(heap) = pcb.heap.take() {
            self.frames.free_pages(heap.addr, heap.pages);
        }
        for entry in pcb.fds.drain() {
            self.pipes.drop_ref(entry);
        }
        pcb.terms.clear();

        if let Some(parent) = pcb.ppid.and_then(|p| self.processes.get_mut(&p)) {
            parent.children.retain(|&c| c != pid);
        }
        self.sched.remove(pid);
        self.stats.processes_destroyed += 1;
        debug!("destroyed process {} '{}'", pid, pcb.name);
        Ok(())
    }

    /// Terminate a process whose own program faulted.
    pub(crate) fn terminate_on_fault(&mut self, pid: Pid, fault: &VmFault) -> Result<(), ProcessError> {
        let sig = match fault {
            VmFault::Memory(_)
            | VmFault::AddressOutOfRange(_)
            | VmFault::StackOverflow(_)
            | VmFault::StackUnderflow(_)
            | VmFault::PcOutOfRange(_) => SIGSEGV,
            _ => SIGILL,
        };
        warn!("process {} killed by {}: {}", pid, signal::name(sig), fault);
        self.exit_process(pid, 128 + sig)
    }
}

/// Errors from process management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("process table is full")]
    TableFull,

    #[error("out of physical frames")]
    OutOfMemory,

    #[error("no process with pid {0}")]
    NoSuchProcess(Pid),

    #[error("process {pid}: illegal transition {from} -> {to}")]
    InvalidTransition { pid: Pid, from: ProcessState, to: ProcessState },

    #[error("process {0} has not terminated")]
    NotTerminated(Pid),

    #[error("the kernel process cannot do that")]
    KernelProcess,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernel::console::BufferConsole;

    fn kernel() -> Kernel {
        Kernel::boot(KernelConfig::default(), Box::new(BufferConsole::new())).unwrap()
    }

    #[test]
    fn test_pids_are_monotonic() {
        let mut k = kernel();
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        let b = k.create_process("b", Some(KERNEL_PID)).unwrap();
        k.exit_process(a, 0).unwrap();
        let c = k.create_process("c", Some(KERNEL_PID)).unwrap();
        assert!(KERNEL_PID < a && a < b && b < c);
    }

    #[test]
    fn test_table_full() {
        let config = KernelConfig { max_processes: 3, ..KernelConfig::default() };
        let mut k = Kernel::boot(config, Box::new(BufferConsole::new())).unwrap();
        k.create_process("a", Some(KERNEL_PID)).unwrap();
        k.create_process("b", Some(KERNEL_PID)).unwrap();
        assert_eq!(k.create_process("c", Some(KERNEL_PID)), Err(ProcessError::TableFull));
    }

    #[test]
    fn test_failed_creation_releases_frames() {
        // Room for the kernel process plus one kernel stack, not a user stack
        let config = KernelConfig { frames: 1 + 6 + 2 + 1, ..KernelConfig::default() };
        let mut k = Kernel::boot(config, Box::new(BufferConsole::new())).unwrap();
        let free = k.frames().free_frames();
        assert_eq!(k.create_process("big", Some(KERNEL_PID)), Err(ProcessError::OutOfMemory));
        assert_eq!(k.frames().free_frames(), free);
        assert_eq!(k.process_count(), 1);
    }

    #[test]
    fn test_destroy_requires_termination() {
        let mut k = kernel();
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        assert_eq!(k.destroy_process(a), Err(ProcessError::NotTerminated(a)));
    }

    #[test]
    fn test_exit_under_kernel_reaps_and_frees() {
        let mut k = kernel();
        let free = k.frames().free_frames();
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        assert!(k.frames().free_frames() < free);
        k.exit_process(a, 3).unwrap();
        assert!(k.process(a).is_none());
        assert_eq!(k.frames().free_frames(), free);
    }

    #[test]
    fn test_zombie_waits_for_parent() {
        let mut k = kernel();
        let parent = k.create_process("parent", Some(KERNEL_PID)).unwrap();
        let child = k.create_process("child", Some(parent)).unwrap();
        k.exit_process(child, 7).unwrap();
        let zombie = k.process(child).unwrap();
        assert!(zombie.terminated);
        assert_eq!(zombie.state, ProcessState::Blocked);
        assert!(k.process(parent).unwrap().signals.is_pending(SIGCHLD));
        assert_eq!(k.reap_child(parent, WaitTarget::Any).unwrap(), Some((child, 7)));
        assert!(k.process(child).is_none());
    }

    #[test]
    fn test_orphans_are_adopted() {
        let mut k = kernel();
        let parent = k.create_process("parent", Some(KERNEL_PID)).unwrap();
        let child = k.create_process("child", Some(parent)).unwrap();
        k.exit_process(parent, 0).unwrap();
        assert_eq!(k.process(child).unwrap().ppid, Some(KERNEL_PID));
        k.exit_process(child, 0).unwrap();
        assert!(k.process(child).is_none());
    }

    #[test]
    fn test_transitions() {
        assert!(ProcessState::Ready.can_transition(ProcessState::Running));
        assert!(ProcessState::Blocked.can_transition(ProcessState::Ready));
        assert!(!ProcessState::Blocked.can_transition(ProcessState::Running));
        assert!(!ProcessState::Ready.can_transition(ProcessState::Blocked));
        assert_eq!(clamp_priority(5), Trit::P);
        assert_eq!(clamp_priority(-9), Trit::N);
    }
}
