//! Table-driven syscall dispatch.
//!
//! Every syscall answers with a trit: P success, O neutral or partial,
//! N failure. Scalar results travel in the caller's saved context.

use log::{debug, trace};
use thiserror::Error;
use crate::kernel::process::{Pid, KERNEL_PID};
use crate::kernel::Kernel;
use crate::ternary::Trit;

pub const MAX_SYSCALLS: usize = 256;

/// Wire numbers.
pub mod nr {
    pub const EXIT: usize = 0;
    pub const FORK: usize = 1;
    pub const EXEC: usize = 2;
    pub const WAIT: usize = 3;
    pub const GETPID: usize = 4;
    pub const GETPPID: usize = 5;
    pub const KILL: usize = 6;
    pub const SIGNAL: usize = 7;
    pub const BRK: usize = 8;
    pub const YIELD: usize = 9;

    pub const READ: usize = 11;
    pub const WRITE: usize = 12;
    pub const CLOSE: usize = 13;

    pub const PIPE: usize = 50;
    pub const DUP: usize = 51;
    pub const DUP2: usize = 52;
    pub const SLEEP: usize = 53;

    pub const LAMBDA_REDUCE: usize = 100;
    pub const LAMBDA_TYPECHECK: usize = 101;
    pub const LAMBDA_EVAL: usize = 102;
    pub const LAMBDA_PARSE: usize = 103;
    pub const LAMBDA_INFER: usize = 104;
    pub const LAMBDA_PROOF: usize = 105;
    pub const LAMBDA_COMPILE: usize = 106;
    pub const LAMBDA_FREE: usize = 107;

    pub const UPTIME: usize = 120;
    pub const SYSINFO: usize = 121;
    pub const TVM_STATS: usize = 122;
    pub const SIGMASK: usize = 123;
    pub const SETPRIORITY: usize = 124;
    pub const SET_QUANTUM: usize = 125;
    pub const CONSOLE_PUTS: usize = 126;
}

/// Arguments as seen by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallArgs {
    /// The process that trapped.
    pub caller: Pid,
    pub args: [i64; 6],
}

impl SyscallArgs {
    pub fn new(caller: Pid, args: [i64; 6]) -> Self {
        Self { caller, args }
    }

    pub fn arg(&self, i: usize) -> i64 {
        self.args.get(i).copied().unwrap_or(0)
    }
}

pub type SyscallHandler = fn(&mut Kernel, &SyscallArgs) -> Trit;

#[derive(Debug, Clone, Copy)]
pub struct SyscallEntry {
    pub handler: SyscallHandler,
    pub name: &'static str,
    pub arg_count: usize,
    pub privileged: bool,
}

pub struct SyscallTable {
    entries: Vec<Option<SyscallEntry>>,
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self { entries: vec![None; MAX_SYSCALLS] }
    }
}

impl std::fmt::Debug for SyscallTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyscallTable").field("registered", &self.len()).finish()
    }
}

impl SyscallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `entry` at `num`, replacing any previous one.
    pub fn register(&mut self, num: usize, entry: SyscallEntry) -> Result<(), SyscallError> {
        let slot = self.entries.get_mut(num).ok_or(SyscallError::OutOfRange(num))?;
        *slot = Some(entry);
        Ok(())
    }

    pub fn unregister(&mut self, num: usize) -> Option<SyscallEntry> {
        self.entries.get_mut(num).and_then(Option::take)
    }

    pub fn get(&self, num: i64) -> Option<&SyscallEntry> {
        let i = usize::try_from(num).ok()?;
        self.entries.get(i).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered entries with their numbers.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SyscallEntry)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }
}

impl Kernel {
    pub fn register_syscall(
        &mut self,
        num: usize,
        name: &'static str,
        arg_count: usize,
        privileged: bool,
        handler: SyscallHandler,
    ) -> Result<(), SyscallError> {
        self.syscalls.register(num, SyscallEntry { handler, name, arg_count, privileged })
    }

    pub fn syscalls(&self) -> &SyscallTable {
        &self.syscalls
    }

    /// Dispatch on behalf of the current process.
    pub fn dispatch(&mut self, num: i64, args: [i64; 6]) -> Trit {
        let caller = self.sched.current.unwrap_or(KERNEL_PID);
        self.dispatch_from(caller, num, args)
    }

    /// Dispatch on behalf of `caller`.
    pub fn dispatch_from(&mut self, caller: Pid, num: i64, args: [i64; 6]) -> Trit {
        let Some(entry) = self.syscalls.get(num).copied() else {
            debug!("process {}: no syscall {}", caller, num);
            self.stats.failed_syscalls += 1;
            return Trit::N;
        };
        if entry.privileged && caller != KERNEL_PID {
            debug!("process {}: {} is privileged", caller, entry.name);
            self.stats.failed_syscalls += 1;
            return Trit::N;
        }

        self.stats.total_syscalls += 1;
        trace!("process {}: {}({:?})", caller, entry.name, &args[..entry.arg_count.min(6)]);
        let status = (entry.handler)(self, &SyscallArgs::new(caller, args));
        if status == Trit::N {
            debug!("process {}: {} failed", caller, entry.name);
            self.stats.failed_syscalls += 1;
        }
        status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyscallError {
    #[error("syscall number {0} out of range")]
    OutOfRange(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernel::console::BufferConsole;

    fn kernel() -> Kernel {
        Kernel::boot(KernelConfig::default(), Box::new(BufferConsole::new())).unwrap()
    }

    fn poison(k: &mut Kernel, _: &SyscallArgs) -> Trit {
        k.stats.processes_created += 1000;
        Trit::P
    }

    #[test]
    fn test_privileged_denied_for_user_process() {
        let mut k = kernel();
        k.register_syscall(200, "poison", 0, true, poison).unwrap();
        let pid = k.create_process("user", Some(KERNEL_PID)).unwrap();
        k.schedule();
        assert_eq!(k.current(), Some(pid));

        let created = k.stats().processes_created;
        let failed = k.stats().failed_syscalls;
        assert_eq!(k.dispatch(200, [0; 6]), Trit::N);
        assert_eq!(k.stats().failed_syscalls, failed + 1);
        assert_eq!(k.stats().processes_created, created);

        assert_eq!(k.dispatch_from(KERNEL_PID, 200, [0; 6]), Trit::P);
        assert_eq!(k.stats().processes_created, created + 1000);
    }

    #[test]
    fn test_unknown_and_out_of_range() {
        let mut k = kernel();
        assert_eq!(k.dispatch(250, [0; 6]), Trit::N);
        assert_eq!(k.dispatch(256, [0; 6]), Trit::N);
        assert_eq!(k.dispatch(-1, [0; 6]), Trit::N);
        assert_eq!(k.stats().failed_syscalls, 3);
        assert_eq!(k.stats().total_syscalls, 0);
        assert_eq!(
            k.register_syscall(MAX_SYSCALLS, "x", 0, false, poison),
            Err(SyscallError::OutOfRange(MAX_SYSCALLS))
        );
    }

    #[test]
    fn test_registration_replaces() {
        fn ok(_: &mut Kernel, _: &SyscallArgs) -> Trit {
            Trit::P
        }
        fn neutral(_: &mut Kernel, _: &SyscallArgs) -> Trit {
            Trit::O
        }
        let mut k = kernel();
        k.register_syscall(210, "t", 0, false, ok).unwrap();
        k.register_syscall(210, "t", 0, false, neutral).unwrap();
        assert_eq!(k.dispatch(210, [0; 6]), Trit::O);
        assert!(k.syscalls().iter().any(|(n, e)| n == nr::GETPID && e.name == "getpid"));
    }
}
