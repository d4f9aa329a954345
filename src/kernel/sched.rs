//! Priority round-robin scheduler.
//!
//! One FIFO queue per priority class; the head of the highest non-empty
//! class runs next. The kernel process never queues and runs only when
//! nothing else is ready.

use std::collections::VecDeque;
use log::{debug, info, trace, warn};
use crate::kernel::process::{Pid, ProcessError, ProcessState, KERNEL_PID};
use crate::kernel::signal::{self, Disposition, Signal, SignalAction, SIGSEGV};
use crate::kernel::Kernel;
use crate::ternary::Trit;
use crate::tvm::registers::R_ARG0;

fn class(priority: Trit) -> usize {
    match priority {
        Trit::P => 0,
        Trit::O => 1,
        _ => 2,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    /// Ready queues, highest priority first.
    queues: [VecDeque<Pid>; 3],
    pub current: Option<Pid>,
    pub quantum: u64,
    pub need_resched: bool,
    preempt_count: u32,
    pub ticks: u64,
}

impl Scheduler {
    pub fn new(quantum: u64) -> Self {
        Self { quantum, ..Self::default() }
    }

    pub fn enqueue(&mut self, pid: Pid, priority: Trit) {
        self.queues[class(priority)].push_back(pid);
    }

    /// Drop `pid` from whichever queue holds it.
    pub fn remove(&mut self, pid: Pid) {
        for q in self.queues.iter_mut() {
            q.retain(|&p| p != pid);
        }
    }

    fn pick_next(&mut self) -> Option<Pid> {
        self.queues.iter_mut().find_map(VecDeque::pop_front)
    }

    pub fn has_ready(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    pub fn ready_count(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Queued pids of one priority class, head first.
    pub fn queued(&self, priority: Trit) -> Vec<Pid> {
        self.queues[class(priority)].iter().copied().collect()
    }

    pub fn is_queued(&self, pid: Pid) -> bool {
        self.queues.iter().any(|q| q.contains(&pid))
    }

    pub fn preemptible(&self) -> bool {
        self.preempt_count == 0
    }
}

impl Kernel {
    /// Pick the next process and switch to it.
    ///
    /// With preemption disabled and a process running this only records
    /// that a switch is due.
    pub fn schedule(&mut self) {
        if !self.sched.preemptible() {
            let running = self
                .sched
                .current
                .and_then(|pid| self.processes.get(&pid))
                .is_some_and(|p| p.state == ProcessState::Running);
            if running {
                self.sched.need_resched = true;
                return;
            }
        }
        self.sched.need_resched = false;

        let prev = self.sched.current.take();
        if let Some(p) = prev.and_then(|pid| self.processes.get_mut(&pid)) {
            if p.state == ProcessState::Running {
                p.state = ProcessState::Ready;
                if !p.is_kernel() {
                    self.sched.enqueue(p.pid, p.priority);
                }
            }
        }

        let next = self.sched.pick_next().unwrap_or(KERNEL_PID);
        if let Some(p) = self.processes.get_mut(&next) {
            p.state = ProcessState::Running;
            p.ticks_recent = 0;
        }
        self.sched.current = Some(next);
        if prev != Some(next) {
            self.stats.context_switches += 1;
            trace!("switch {:?} -> {}", prev, next);
        }

        // A fatal signal reschedules from inside exit_process
        self.handle_signals(next);
    }

    /// One timer tick: wake sleepers, charge the current process and
    /// preempt it when its quantum is spent.
    pub fn tick(&mut self) {
        self.sched.ticks += 1;
        let now = self.sched.ticks;

        let due: Vec<Pid> = self
            .processes
            .values()
            .filter(|p| !p.terminated && p.state == ProcessState::Blocked)
            .filter(|p| p.sleep_until.is_some_and(|t| t <= now))
            .map(|p| p.pid)
            .collect();
        for pid in due {
            if let Some(p) = self.processes.get_mut(&pid) {
                p.sleep_until = None;
                p.set_tvm_result(Trit::P, 0);
            }
            if let Err(e) = self.unblock(pid) {
                warn!("wakeup of {} failed: {}", pid, e);
            }
        }

        let Some(cur) = self.sched.current else {
            self.schedule();
            return;
        };
        let quantum = self.sched.quantum;
        let expired = match self.processes.get_mut(&cur) {
            Some(p) => {
                p.ticks_total += 1;
                p.ticks_recent += 1;
                !p.is_kernel() && p.ticks_recent >= quantum
            }
            None => true,
        };

        if cur == KERNEL_PID {
            if self.sched.has_ready() {
                self.schedule();
            }
        } else if expired {
            self.stats.preemptions += 1;
            trace!("quantum expired for {}", cur);
            self.schedule();
        }
    }

    /// Give up the CPU; the current process goes to the tail of its class.
    pub fn yield_cpu(&mut self) {
        self.schedule();
    }

    pub fn current(&self) -> Option<Pid> {
        self.sched.current
    }

    pub fn ticks(&self) -> u64 {
        self.sched.ticks
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn preempt_disable(&mut self) {
        self.sched.preempt_count += 1;
    }

    /// Re-enable preemption, running any switch deferred meanwhile.
    pub fn preempt_enable(&mut self) {
        self.sched.preempt_count = self.sched.preempt_count.saturating_sub(1);
        if self.sched.preemptible() && self.sched.need_resched {
            self.schedule();
        }
    }

    pub fn set_quantum(&mut self, quantum: u64) {
        self.sched.quantum = quantum.max(1);
    }

    /// Block a running process.
    pub fn block(&mut self, pid: Pid) -> Result<(), ProcessError> {
        if pid == KERNEL_PID {
            return Err(ProcessError::KernelProcess);
        }
        self.transition(pid, ProcessState::Blocked)?;
        self.sched.remove(pid);
        debug!("process {} blocked", pid);
        if self.sched.current == Some(pid) {
            self.sched.current = None;
            self.schedule();
        }
        Ok(())
    }

    /// Make a blocked process ready. It preempts the idle process.
    pub fn unblock(&mut self, pid: Pid) -> Result<(), ProcessError> {
        self.transition(pid, ProcessState::Ready)?;
        let priority = self.pcb(pid)?.priority;
        self.sched.enqueue(pid, priority);
        debug!("process {} unblocked", pid);
        if self.sched.current == Some(KERNEL_PID) {
            self.schedule();
        }
        Ok(())
    }

    /// Change a process's priority, moving it to the tail of its new class.
    pub fn set_priority(&mut self, pid: Pid, priority: i64) -> Result<(), ProcessError> {
        let prio = crate::kernel::process::clamp_priority(priority);
        let pcb = self.pcb_mut(pid)?;
        pcb.priority = prio;
        let ready = pcb.state == ProcessState::Ready && !pcb.is_kernel();
        if ready {
            self.sched.remove(pid);
            self.sched.enqueue(pid, prio);
        }
        Ok(())
    }

    /// Put the calling process to sleep for `ticks` ticks.
    pub fn sleep(&mut self, pid: Pid, ticks: u64) -> Result<(), ProcessError> {
        let until = self.sched.ticks + ticks;
        self.pcb_mut(pid)?.sleep_until = Some(until);
        self.block(pid)
    }

    /// Queue a signal. A blocked process with something to act on it wakes
    /// up, and its pending syscall fails.
    pub fn send_signal(&mut self, pid: Pid, sig: Signal) -> bool {
        let Some(p) = self.processes.get_mut(&pid) else { return false };
        if p.terminated || !p.signals.send(sig) {
            return false;
        }
        let acts = match p.signals.action(sig) {
            _ if signal::is_uncatchable(sig) => true,
            SignalAction::Handler(_) => true,
            SignalAction::Default => signal::is_fatal_by_default(sig),
            SignalAction::Ignore => false,
        };
        if acts && p.state == ProcessState::Blocked {
            p.waiting_for = None;
            p.sleep_until = None;
            p.set_tvm_result(Trit::N, 0);
            if let Err(e) = self.unblock(pid) {
                warn!("could not wake {} for {}: {}", pid, signal::name(sig), e);
            }
        }
        true
    }

    /// Deliver pending signals to `pid`. Returns true if it was terminated.
    pub(crate) fn handle_signals(&mut self, pid: Pid) -> bool {
        let dispositions = match self.processes.get_mut(&pid) {
            Some(p) if !p.terminated && p.signals.has_pending() => p.signals.drain(),
            _ => return false,
        };
        for d in dispositions {
            self.stats.signals_delivered += 1;
            match d {
                Disposition::Terminate(sig) => {
                    info!("process {} terminated by {}", pid, signal::name(sig));
                    if let Err(e) = self.exit_process(pid, 128 + sig) {
                        warn!("{} for {} not delivered: {}", signal::name(sig), pid, e);
                        return false;
                    }
                    return true;
                }
                Disposition::Handle(sig, addr) => {
                    let Some(p) = self.processes.get_mut(&pid) else { return false };
                    if !p.has_program {
                        continue;
                    }
                    debug!("process {} entering handler for {} at {}", pid, signal::name(sig), addr);
                    if let Err(fault) = p.tvm.enter_handler(addr) {
                        warn!("process {} cannot enter handler: {}", pid, fault);
                        if let Err(e) = self.exit_process(pid, 128 + SIGSEGV) {
                            debug!("process {} not terminated: {}", pid, e);
                        }
                        return true;
                    }
                    p.tvm.regs.set_value(R_ARG0, sig as i64);
                }
                Disposition::Discard(sig) => trace!("process {} discards {}", pid, signal::name(sig)),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernel::console::BufferConsole;
    use crate::kernel::signal::{SIGKILL, SIGTERM, SIGUSR1};
    use proptest::prelude::*;

    fn kernel_with_quantum(quantum: u64) -> Kernel {
        let config = KernelConfig { quantum, ..KernelConfig::default() };
        Kernel::boot(config, Box::new(BufferConsole::new())).unwrap()
    }

    fn running(k: &Kernel) -> Vec<Pid> {
        k.processes().filter(|p| p.state == ProcessState::Running).map(|p| p.pid).collect()
    }

    /// Run `quanta` quanta and record who held the CPU in each.
    fn selections(k: &mut Kernel, quanta: usize) -> Vec<Pid> {
        let q = k.scheduler().quantum;
        let mut out = Vec::new();
        for _ in 0..quanta {
            out.push(k.current().unwrap());
            for _ in 0..q {
                k.tick();
            }
        }
        out
    }

    #[test]
    fn test_priority_then_round_robin() {
        let mut k = kernel_with_quantum(3);
        let a = k.create_process("A", Some(KERNEL_PID)).unwrap();
        let b = k.create_process("B", Some(KERNEL_PID)).unwrap();
        let c = k.create_process("C", Some(KERNEL_PID)).unwrap();
        k.set_priority(a, 1).unwrap();
        k.schedule();

        let picks = selections(&mut k, 30);
        assert!(picks.iter().all(|&p| p == a));

        k.block(a).unwrap();
        let picks = selections(&mut k, 6);
        assert_eq!(picks, vec![b, c, b, c, b, c]);
        assert_eq!(running(&k).len(), 1);
    }

    #[test]
    fn test_equal_share_per_cycle() {
        let mut k = kernel_with_quantum(4);
        let pids: Vec<Pid> = (0..3).map(|i| k.create_process(&format!("p{}", i), Some(KERNEL_PID)).unwrap()).collect();
        k.schedule();
        for _ in 0..12 {
            k.tick();
        }
        for pid in pids {
            assert_eq!(k.process(pid).unwrap().ticks_total, 4);
        }
        assert_eq!(k.stats().preemptions, 3);
    }

    #[test]
    fn test_idle_runs_when_nothing_ready() {
        let mut k = kernel_with_quantum(2);
        k.schedule();
        assert_eq!(k.current(), Some(KERNEL_PID));
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        k.tick();
        assert_eq!(k.current(), Some(a));
        k.block(a).unwrap();
        assert_eq!(k.current(), Some(KERNEL_PID));
        k.unblock(a).unwrap();
        assert_eq!(k.current(), Some(a));
    }

    #[test]
    fn test_yield_moves_to_tail() {
        let mut k = kernel_with_quantum(10);
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        let b = k.create_process("b", Some(KERNEL_PID)).unwrap();
        k.schedule();
        assert_eq!(k.current(), Some(a));
        k.yield_cpu();
        assert_eq!(k.current(), Some(b));
        assert_eq!(k.scheduler().queued(Trit::O), vec![a]);
    }

    #[test]
    fn test_sleep_and_wakeup() {
        let mut k = kernel_with_quantum(10);
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        k.schedule();
        k.sleep(a, 3).unwrap();
        assert_eq!(k.process(a).unwrap().state, ProcessState::Blocked);
        k.tick();
        k.tick();
        assert_eq!(k.current(), Some(KERNEL_PID));
        k.tick();
        assert_eq!(k.current(), Some(a));
    }

    #[test]
    fn test_deferred_reschedule() {
        let mut k = kernel_with_quantum(2);
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        let b = k.create_process("b", Some(KERNEL_PID)).unwrap();
        k.schedule();
        k.preempt_disable();
        k.tick();
        k.tick();
        assert_eq!(k.current(), Some(a));
        assert!(k.scheduler().need_resched);
        k.preempt_enable();
        assert_eq!(k.current(), Some(b));
        assert!(!k.scheduler().need_resched);
    }

    #[test]
    fn test_fatal_signal_at_scheduler_entry() {
        let mut k = kernel_with_quantum(10);
        let a = k.create_process("a", Some(KERNEL_PID)).unwrap();
        let b = k.create_process("b", Some(KERNEL_PID)).unwrap();
        assert!(k.send_signal(a, SIGTERM));
        k.schedule();
        assert!(k.process(a).is_none());
        assert_eq!(k.current(), Some(b));
        assert_eq!(k.stats().signals_delivered, 1);
    }

    #[test]
    fn test_kill_wakes_sleeper() {
        let mut k = kernel_with_quantum(10);
        let parent = k.create_process("parent", Some(KERNEL_PID)).unwrap();
        let a = k.create_process("a", Some(parent)).unwrap();
        k.schedule();
        k.yield_cpu();
        assert_eq!(k.current(), Some(a));
        k.sleep(a, 100).unwrap();
        k.send_signal(a, SIGUSR1);
        assert_eq!(k.process(a).unwrap().state, ProcessState::Blocked);
        k.send_signal(a, SIGKILL);
        assert_eq!(k.process(a).unwrap().state, ProcessState::Ready);
        while k.process(a).is_some_and(|p| !p.terminated) {
            k.tick();
        }
        assert_eq!(k.process(a).unwrap().exit_code, 128 + SIGKILL);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(i64),
        Tick,
        Yield,
        BlockCurrent,
        UnblockAny,
        ExitCurrent,
        Kill(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-1i64..=1).prop_map(Op::Create),
            Just(Op::Tick),
            Just(Op::Yield),
            Just(Op::BlockCurrent),
            Just(Op::UnblockAny),
            Just(Op::ExitCurrent),
            (0usize..8).prop_map(Op::Kill),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_running(ops in proptest::collection::vec(op(), 1..80)) {
            let mut k = kernel_with_quantum(2);
            let mut last_pid = KERNEL_PID;
            for op in ops {
                match op {
                    Op::Create(prio) => {
                        if let Ok(pid) = k.create_process("p", Some(KERNEL_PID)) {
                            prop_assert!(pid > last_pid);
                            last_pid = pid;
                            k.set_priority(pid, prio).unwrap();
                        }
                    }
                    Op::Tick => k.tick(),
                    Op::Yield => k.yield_cpu(),
                    Op::BlockCurrent => {
                        if let Some(cur) = k.current().filter(|&p| p != KERNEL_PID) {
                            k.block(cur).unwrap();
                        }
                    }
                    Op::UnblockAny => {
                        let blocked = k.processes()
                            .find(|p| p.state == ProcessState::Blocked && !p.terminated)
                            .map(|p| p.pid);
                        if let Some(pid) = blocked {
                            k.unblock(pid).unwrap();
                        }
                    }
                    Op::ExitCurrent => {
                        if let Some(cur) = k.current().filter(|&p| p != KERNEL_PID) {
                            k.exit_process(cur, 0).unwrap();
                        }
                    }
                    Op::Kill(i) => {
                        let pids = k.pids();
                        let pid = pids[i % pids.len()];
                        k.send_signal(pid, SIGKILL);
                    }
                }
                prop_assert!(running(&k).len() <= 1);
                if let Some(cur) = k.current() {
                    prop_assert!(!k.scheduler().is_queued(cur));
                }
            }
        }
    }
}
