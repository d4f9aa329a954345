//! Syscall handlers and the default table.
//!
//! Pointer arguments are byte addresses in physical memory. Scalar results
//! go to the caller's `context.retval`.

use log::{debug, info};
use crate::asm::image;
use crate::kernel::fd::{FdEntry, PipeRead};
use crate::kernel::mm::{FrameAllocator, Region};
use crate::kernel::process::{Pid, WaitTarget, KERNEL_PID};
use crate::kernel::signal::{self, SignalAction, SIGPIPE};
use crate::kernel::syscall::{nr, SyscallArgs, SyscallError, SyscallHandler};
use crate::kernel::Kernel;
use crate::lambda::church::{as_boolean, as_numeral};
use crate::lambda::{
    alpha_equiv, compile_to_t3, infer_type, is_well_formed, parse_term_bounded, reduce_to_normal_form, ReductionContext,
    TermRef,
};
use crate::ternary::Trit;

/// Install every built-in syscall.
pub fn register_default_syscalls(k: &mut Kernel) -> Result<(), SyscallError> {
    const TABLE: &[(usize, &str, usize, bool, SyscallHandler)] = &[
        (nr::EXIT, "exit", 1, false, sys_exit),
        (nr::FORK, "fork", 0, false, sys_fork),
        (nr::EXEC, "exec", 2, false, sys_exec),
        (nr::WAIT, "wait", 1, false, sys_wait),
        (nr::GETPID, "getpid", 0, false, sys_getpid),
        (nr::GETPPID, "getppid", 0, false, sys_getppid),
        (nr::KILL, "kill", 2, false, sys_kill),
        (nr::SIGNAL, "signal", 3, false, sys_signal),
        (nr::BRK, "brk", 1, false, sys_brk),
        (nr::YIELD, "yield", 0, false, sys_yield),
        (nr::READ, "read", 3, false, sys_read),
        (nr::WRITE, "write", 3, false, sys_write),
        (nr::CLOSE, "close", 1, false, sys_close),
        (nr::PIPE, "pipe", 1, false, sys_pipe),
        (nr::DUP, "dup", 1, false, sys_dup),
        (nr::DUP2, "dup2", 2, false, sys_dup2),
        (nr::SLEEP, "sleep", 1, false, sys_sleep),
        (nr::LAMBDA_REDUCE, "lambda_reduce", 2, false, sys_lambda_reduce),
        (nr::LAMBDA_TYPECHECK, "lambda_typecheck", 1, false, sys_lambda_typecheck),
        (nr::LAMBDA_EVAL, "lambda_eval", 2, false, sys_lambda_eval),
        (nr::LAMBDA_PARSE, "lambda_parse", 2, false, sys_lambda_parse),
        (nr::LAMBDA_INFER, "lambda_infer", 3, false, sys_lambda_infer),
        (nr::LAMBDA_PROOF, "lambda_verify", 3, false, sys_lambda_verify),
        (nr::LAMBDA_COMPILE, "lambda_compile", 3, false, sys_lambda_compile),
        (nr::LAMBDA_FREE, "lambda_free", 1, false, sys_lambda_free),
        (nr::UPTIME, "uptime", 0, false, sys_uptime),
        (nr::SYSINFO, "sysinfo", 1, false, sys_sysinfo),
        (nr::TVM_STATS, "tvm_stats", 1, false, sys_tvm_stats),
        (nr::SIGMASK, "sigmask", 2, false, sys_sigmask),
        (nr::SETPRIORITY, "setpriority", 2, false, sys_setpriority),
        (nr::SET_QUANTUM, "set_quantum", 1, true, sys_set_quantum),
        (nr::CONSOLE_PUTS, "console_puts", 2, false, sys_console_puts),
    ];
    for &(num, name, argc, privileged, handler) in TABLE {
        k.register_syscall(num, name, argc, privileged, handler)?;
    }
    Ok(())
}

fn arg_usize(v: i64) -> Option<usize> {
    usize::try_from(v).ok()
}

impl Kernel {
    fn set_retval(&mut self, pid: Pid, value: i64) {
        if let Some(p) = self.processes.get_mut(&pid) {
            p.context.retval = value;
        }
    }

    fn read_user(&self, ptr: i64, len: i64) -> Option<Vec<u8>> {
        let (ptr, len) = (arg_usize(ptr)?, arg_usize(len)?);
        match self.phys.read(ptr, len) {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                debug!("bad user buffer: {}", e);
                None
            }
        }
    }

    fn write_user(&mut self, ptr: i64, data: &[u8]) -> bool {
        let Some(ptr) = arg_usize(ptr) else { return false };
        match self.phys.write(ptr, data) {
            Ok(()) => true,
            Err(e) => {
                debug!("bad user buffer: {}", e);
                false
            }
        }
    }

    fn term(&self, pid: Pid, handle: i64) -> Option<TermRef> {
        self.processes.get(&pid).and_then(|p| p.terms.get(handle))
    }

    /// A handle's term, if it is shallow enough to walk recursively.
    fn bounded_term(&self, pid: Pid, handle: i64) -> Option<TermRef> {
        let t = self.term(pid, handle)?;
        let depth = t.depth();
        if depth > self.config.lambda.max_depth {
            debug!("term {} of process {} is {} deep", handle, pid, depth);
            return None;
        }
        Some(t)
    }

    fn insert_term(&mut self, pid: Pid, t: TermRef) -> Option<u32> {
        self.processes.get_mut(&pid).map(|p| p.terms.insert(t))
    }

    /// Normal-order reduction under the configured limits; `None` on timeout.
    fn reduce_term(&self, t: &TermRef, max_steps: i64) -> Option<TermRef> {
        let limits = &self.config.lambda;
        let steps = u64::try_from(max_steps).ok().filter(|&s| s > 0).unwrap_or(limits.max_steps);
        let mut ctx = ReductionContext::new(steps, limits.max_depth);
        let result = reduce_to_normal_form(t, &mut ctx);
        if ctx.timeout {
            info!("lambda reduction timed out after {} steps", ctx.reduction_count);
            return None;
        }
        Some(result)
    }
}

// ========================================================================
// Process and memory control
// ========================================================================

fn sys_exit(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    match k.exit_process(a.caller, a.arg(0) as u32) {
        Ok(()) => Trit::P,
        Err(e) => {
            debug!("exit: {}", e);
            Trit::N
        }
    }
}

fn sys_fork(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(parent) = k.processes.get(&a.caller) else { return Trit::N };
    let name = parent.name.clone();
    let child = match k.create_process(&name, Some(a.caller)) {
        Ok(pid) => pid,
        Err(e) => {
            debug!("fork: {}", e);
            return Trit::N;
        }
    };

    let Some(parent) = k.processes.get(&a.caller) else { return Trit::N };
    let tvm = parent.tvm.clone();
    let has_program = parent.has_program;
    let priority = parent.priority;
    let mut signals = parent.signals.clone();
    let fds = parent.fds.clone();
    let terms = parent.terms.clone();
    let argv = parent.argv.clone();
    let heap = parent.heap;
    signals.drain();

    // The child gets its own copy of the heap
    let child_heap = match heap {
        Some(h) => match k.frames.alloc_pages(h.pages) {
            Some(addr) => {
                let len = h.len(k.frames.frame_size());
                if let Err(e) = k.phys.copy_within(h.addr, addr, len) {
                    debug!("fork: heap copy failed: {}", e);
                }
                Some(Region { addr, pages: h.pages })
            }
            None => {
                debug!("fork: no frames for heap copy");
                if let Some(c) = k.processes.get_mut(&child) {
                    c.terminated = true;
                }
                // Parent observes the failure directly
                if let Err(e) = k.destroy_process(child) {
                    debug!("fork: discarding {}: {}", child, e);
                }
                return Trit::N;
            }
        },
        None => None,
    };

    for (_, entry) in fds.entries() {
        k.pipes.add_ref(entry);
    }
    if let Some(c) = k.processes.get_mut(&child) {
        c.tvm = tvm;
        c.has_program = has_program;
        c.signals = signals;
        c.fds = fds;
        c.terms = terms;
        c.argv = argv;
        c.heap = child_heap;
        c.set_tvm_result(Trit::P, 0);
    }
    if priority != Trit::O {
        if let Err(e) = k.set_priority(child, priority.to_i8().unwrap_or(0) as i64) {
            debug!("fork: priority of {}: {}", child, e);
        }
    }
    k.set_retval(a.caller, child as i64);
    Trit::P
}

fn sys_exec(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(bytes) = k.read_user(a.arg(0), a.arg(1)) else { return Trit::N };
    let words = match image::from_bytes(&bytes) {
        Ok(w) => w,
        Err(e) => {
            debug!("exec: {}", e);
            return Trit::N;
        }
    };
    let Some(p) = k.processes.get_mut(&a.caller) else { return Trit::N };
    // The caller keeps its old image unless the new one loads
    let mut fresh = p.tvm.clone();
    fresh.reset();
    if let Err(e) = fresh.load_program(&words) {
        debug!("exec: {}", e);
        return Trit::N;
    }
    p.tvm = fresh;
    p.has_program = true;
    p.signals.reset_actions();
    info!("process {} exec'd {} words", a.caller, words.len());
    k.set_retval(a.caller, 0);
    Trit::P
}

fn sys_wait(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let target = match a.arg(0) {
        -1 => WaitTarget::Any,
        pid => match u32::try_from(pid) {
            Ok(pid) => WaitTarget::Child(pid),
            Err(_) => return Trit::N,
        },
    };
    let Some(p) = k.processes.get(&a.caller) else { return Trit::N };
    if !p.children.iter().any(|&c| target.matches(c)) {
        return Trit::N;
    }

    match k.reap_child(a.caller, target) {
        Ok(Some((_, code))) => {
            k.set_retval(a.caller, code as i64);
            Trit::P
        }
        Ok(None) => {
            if let Some(p) = k.processes.get_mut(&a.caller) {
                p.waiting_for = Some(target);
            }
            if let Err(e) = k.block(a.caller) {
                debug!("wait: {}", e);
                if let Some(p) = k.processes.get_mut(&a.caller) {
                    p.waiting_for = None;
                }
                return Trit::N;
            }
            Trit::O
        }
        Err(e) => {
            debug!("wait: {}", e);
            Trit::N
        }
    }
}

fn sys_getpid(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    k.set_retval(a.caller, a.caller as i64);
    Trit::P
}

fn sys_getppid(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(p) = k.processes.get(&a.caller) else { return Trit::N };
    let ppid = p.ppid.unwrap_or(KERNEL_PID);
    k.set_retval(a.caller, ppid as i64);
    Trit::P
}

fn sys_kill(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Ok(pid) = u32::try_from(a.arg(0)) else { return Trit::N };
    let sig = a.arg(1);
    if pid == KERNEL_PID || !k.processes.get(&pid).is_some_and(|p| !p.terminated) {
        return Trit::N;
    }
    if sig == 0 {
        return Trit::P;
    }
    if !signal::is_valid(sig) {
        return Trit::N;
    }
    if k.send_signal(pid, sig as u32) {
        Trit::P
    } else {
        Trit::O
    }
}

fn sys_signal(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let sig = a.arg(0);
    if !signal::is_valid(sig) {
        return Trit::N;
    }
    let action = match a.arg(1) {
        0 => SignalAction::Default,
        1 => SignalAction::Ignore,
        2 if a.arg(2) >= 0 => SignalAction::Handler(a.arg(2)),
        _ => return Trit::N,
    };
    let Some(p) = k.processes.get_mut(&a.caller) else { return Trit::N };
    if p.signals.set_action(sig as u32, action) {
        Trit::P
    } else {
        Trit::N
    }
}

/// Resize the heap to `pages` frames, moving its contents. Zero frees it;
/// a negative count only reports the current size.
fn sys_brk(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(p) = k.processes.get(&a.caller) else { return Trit::N };
    let old = p.heap;
    let pages = a.arg(0);
    if pages < 0 {
        let current = old.map_or(0, |h| h.pages);
        k.set_retval(a.caller, current as i64);
        return Trit::O;
    }

    let pages = pages as usize;
    let new = if pages == 0 {
        None
    } else {
        let Some(addr) = k.frames.alloc_pages(pages) else {
            debug!("brk: no room for {} pages", pages);
            return Trit::N;
        };
        let frame = k.frames.frame_size();
        if let Err(e) = k.phys.zero(addr, pages * frame) {
            debug!("brk: {}", e);
        }
        if let Some(h) = old {
            let keep = h.pages.min(pages) * frame;
            if let Err(e) = k.phys.copy_within(h.addr, addr, keep) {
                debug!("brk: {}", e);
            }
        }
        Some(Region { addr, pages })
    };
    if let Some(h) = old {
        k.frames.free_pages(h.addr, h.pages);
    }
    if let Some(p) = k.processes.get_mut(&a.caller) {
        p.heap = new;
    }
    k.set_retval(a.caller, new.map_or(0, |h| h.addr as i64));
    Trit::P
}

fn sys_yield(k: &mut Kernel, _: &SyscallArgs) -> Trit {
    k.yield_cpu();
    Trit::P
}

// ========================================================================
// File descriptors and pipes
// ========================================================================

fn sys_read(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(len) = arg_usize(a.arg(2)) else { return Trit::N };
    let Some(entry) = k.processes.get(&a.caller).and_then(|p| p.fds.get(a.arg(0))) else {
        return Trit::N;
    };
    let FdEntry::PipeRead(id) = entry else { return Trit::N };
    match k.pipes.read(id, len) {
        PipeRead::Data(bytes) => {
            if !k.write_user(a.arg(1), &bytes) {
                return Trit::N;
            }
            k.set_retval(a.caller, bytes.len() as i64);
            Trit::P
        }
        PipeRead::WouldBlock => {
            k.set_retval(a.caller, 0);
            Trit::O
        }
        PipeRead::Eof => {
            k.set_retval(a.caller, 0);
            Trit::P
        }
    }
}

fn sys_write(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let fd = a.arg(0);
    let Some(p) = k.processes.get(&a.caller) else { return Trit::N };
    let entry = match p.fds.get(fd) {
        Some(e) => e,
        None if fd == 1 || fd == 2 => FdEntry::Console,
        None => return Trit::N,
    };
    let Some(data) = k.read_user(a.arg(1), a.arg(2)) else { return Trit::N };

    match entry {
        FdEntry::Console => {
            k.console.write_bytes(&data);
            k.set_retval(a.caller, data.len() as i64);
            Trit::P
        }
        FdEntry::PipeWrite(id) => {
            if !k.pipes.has_readers(id) {
                k.send_signal(a.caller, SIGPIPE);
                return Trit::N;
            }
            let n = k.pipes.write(id, &data);
            k.set_retval(a.caller, n as i64);
            if n == data.len() {
                Trit::P
            } else {
                Trit::O
            }
        }
        FdEntry::PipeRead(_) => Trit::N,
    }
}

fn sys_close(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(entry) = k.processes.get_mut(&a.caller).and_then(|p| p.fds.remove(a.arg(0))) else {
        return Trit::N;
    };
    k.pipes.drop_ref(entry);
    Trit::P
}

/// Create a pipe and store `[read_fd, write_fd]` as two little-endian i32
/// at the pointer.
fn sys_pipe(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    if k.processes.get(&a.caller).is_none() {
        return Trit::N;
    }
    let id = k.pipes.create();
    let (read_end, write_end) = (FdEntry::PipeRead(id), FdEntry::PipeWrite(id));

    let mut installed = Vec::new();
    if let Some(p) = k.processes.get_mut(&a.caller) {
        for entry in [read_end, write_end] {
            match p.fds.install(entry) {
                Some(fd) => installed.push(fd),
                None => break,
            }
        }
    }

    let mut out = Vec::with_capacity(8);
    for fd in &installed {
        out.extend_from_slice(&(*fd as i32).to_le_bytes());
    }
    if installed.len() == 2 && k.write_user(a.arg(0), &out) {
        k.set_retval(a.caller, installed[0]);
        return Trit::P;
    }

    if let Some(p) = k.processes.get_mut(&a.caller) {
        for fd in installed {
            p.fds.remove(fd);
        }
    }
    k.pipes.drop_ref(read_end);
    k.pipes.drop_ref(write_end);
    Trit::N
}

fn sys_dup(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(p) = k.processes.get_mut(&a.caller) else { return Trit::N };
    let Some(entry) = p.fds.get(a.arg(0)) else { return Trit::N };
    let Some(fd) = p.fds.install(entry) else { return Trit::N };
    k.pipes.add_ref(entry);
    k.set_retval(a.caller, fd);
    Trit::P
}

fn sys_dup2(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let (old, new) = (a.arg(0), a.arg(1));
    let Some(p) = k.processes.get_mut(&a.caller) else { return Trit::N };
    let Some(entry) = p.fds.get(old) else { return Trit::N };
    if old != new {
        let Ok(replaced) = p.fds.install_at(new, entry) else { return Trit::N };
        k.pipes.add_ref(entry);
        if let Some(r) = replaced {
            k.pipes.drop_ref(r);
        }
    }
    k.set_retval(a.caller, new);
    Trit::P
}

fn sys_sleep(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let ticks = a.arg(0);
    if ticks <= 0 {
        return Trit::P;
    }
    match k.sleep(a.caller, ticks as u64) {
        Ok(()) => Trit::O,
        Err(e) => {
            debug!("sleep: {}", e);
            Trit::N
        }
    }
}

// ========================================================================
// Lambda calculus
// ========================================================================

fn sys_lambda_parse(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(bytes) = k.read_user(a.arg(0), a.arg(1)) else { return Trit::N };
    let Ok(src) = String::from_utf8(bytes) else { return Trit::N };
    let t = match parse_term_bounded(&src, k.config.lambda.max_depth) {
        Ok(t) => t,
        Err(e) => {
            debug!("lambda_parse: {}", e);
            return Trit::N;
        }
    };
    let Some(handle) = k.insert_term(a.caller, t) else { return Trit::N };
    k.set_retval(a.caller, handle as i64);
    Trit::P
}

fn sys_lambda_reduce(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(t) = k.term(a.caller, a.arg(0)) else { return Trit::N };
    let Some(nf) = k.reduce_term(&t, a.arg(1)) else { return Trit::N };
    let Some(handle) = k.insert_term(a.caller, nf) else { return Trit::N };
    k.set_retval(a.caller, handle as i64);
    Trit::P
}

/// P for a closed term, O for an open one.
fn sys_lambda_typecheck(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(t) = k.term(a.caller, a.arg(0)) else { return Trit::N };
    if is_well_formed(&t) {
        Trit::P
    } else {
        Trit::O
    }
}

/// Reduce and decode. P with the value for a numeral or boolean
/// (numerals win, so Church zero reads as 0), O with a new handle otherwise.
fn sys_lambda_eval(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(t) = k.term(a.caller, a.arg(0)) else { return Trit::N };
    let Some(nf) = k.reduce_term(&t, a.arg(1)) else { return Trit::N };
    if let Some(n) = as_numeral(&nf) {
        k.set_retval(a.caller, n as i64);
        return Trit::P;
    }
    if let Some(b) = as_boolean(&nf) {
        k.set_retval(a.caller, b as i64);
        return Trit::P;
    }
    let Some(handle) = k.insert_term(a.caller, nf) else { return Trit::N };
    k.set_retval(a.caller, handle as i64);
    Trit::O
}

/// Write the principal type as text. O when the term has no simple type.
fn sys_lambda_infer(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(t) = k.bounded_term(a.caller, a.arg(0)) else { return Trit::N };
    let Some(cap) = arg_usize(a.arg(2)) else { return Trit::N };
    let ty = match infer_type(&t) {
        Ok(ty) => ty.to_string(),
        Err(e) => {
            debug!("lambda_infer: {}", e);
            return Trit::O;
        }
    };
    if ty.len() > cap || !k.write_user(a.arg(1), ty.as_bytes()) {
        return Trit::N;
    }
    k.set_retval(a.caller, ty.len() as i64);
    Trit::P
}

/// Proof checking: the proof's normal form must be the theorem.
fn sys_lambda_verify(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(proof) = k.term(a.caller, a.arg(0)) else { return Trit::N };
    let Some(theorem) = k.term(a.caller, a.arg(1)) else { return Trit::N };
    let Some(nf) = k.reduce_term(&proof, a.arg(2)) else { return Trit::N };
    if alpha_equiv(&nf, &theorem) {
        Trit::P
    } else {
        Trit::O
    }
}

fn sys_lambda_compile(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(t) = k.bounded_term(a.caller, a.arg(0)) else { return Trit::N };
    let Some(cap) = arg_usize(a.arg(2)) else { return Trit::N };
    let mut buf = vec![0u8; cap.min(k.phys.size())];
    let n = match compile_to_t3(&t, &mut buf) {
        Ok(n) => n,
        Err(e) => {
            debug!("lambda_compile: {}", e);
            return Trit::N;
        }
    };
    if !k.write_user(a.arg(1), &buf[..n]) {
        return Trit::N;
    }
    k.set_retval(a.caller, n as i64);
    Trit::P
}

fn sys_lambda_free(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    match k.processes.get_mut(&a.caller).and_then(|p| p.terms.remove(a.arg(0))) {
        Some(_) => Trit::P,
        None => Trit::N,
    }
}

// ========================================================================
// System information and control
// ========================================================================

fn sys_uptime(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let ticks = k.sched.ticks;
    k.set_retval(a.caller, ticks as i64);
    Trit::P
}

fn sys_sysinfo(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let value = match a.arg(0) {
        0 => k.processes.len() as u64,
        1 => k.stats.total_syscalls,
        2 => k.stats.failed_syscalls,
        3 => k.stats.context_switches,
        4 => k.frames.free_frames() as u64,
        _ => return Trit::N,
    };
    k.set_retval(a.caller, value as i64);
    Trit::P
}

fn sys_tvm_stats(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(p) = k.processes.get(&a.caller) else { return Trit::N };
    let c = p.tvm.counters();
    let value = match a.arg(0) {
        0 => c.instructions_executed,
        1 => c.cache_hits,
        2 => c.cache_misses,
        3 => c.branch_predictions,
        4 => c.branch_mispredictions,
        5 => c.interrupts_taken,
        6 => c.interrupts_masked,
        _ => return Trit::N,
    };
    k.set_retval(a.caller, value as i64);
    Trit::P
}

/// `how`: 0 replaces the mask, 1 adds to it, 2 removes from it.
fn sys_sigmask(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let bits = a.arg(1) as u32;
    let Some(p) = k.processes.get_mut(&a.caller) else { return Trit::N };
    let old = p.signals.mask();
    let mask = match a.arg(0) {
        0 => bits,
        1 => old | bits,
        2 => old & !bits,
        _ => return Trit::N,
    };
    p.signals.set_mask(mask);
    k.set_retval(a.caller, old as i64);
    Trit::P
}

/// Pid 0 means the caller.
fn sys_setpriority(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let pid = match a.arg(0) {
        0 => a.caller,
        p => match u32::try_from(p) {
            Ok(p) => p,
            Err(_) => return Trit::N,
        },
    };
    if pid == KERNEL_PID {
        return Trit::N;
    }
    match k.set_priority(pid, a.arg(1)) {
        Ok(()) => Trit::P,
        Err(_) => Trit::N,
    }
}

fn sys_set_quantum(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Ok(q) = u64::try_from(a.arg(0)) else { return Trit::N };
    if q == 0 {
        return Trit::N;
    }
    k.set_quantum(q);
    Trit::P
}

fn sys_console_puts(k: &mut Kernel, a: &SyscallArgs) -> Trit {
    let Some(bytes) = k.read_user(a.arg(0), a.arg(1)) else { return Trit::N };
    k.console.write_bytes(&bytes);
    k.set_retval(a.caller, bytes.len() as i64);
    Trit::P
}
