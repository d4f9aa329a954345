//! Signal numbers and per-process signal state.
//!
//! Sending sets a pending bit; pending bits are drained in ascending order
//! when the scheduler switches to the process.

use std::fmt;

pub type Signal = u32;

pub const SIGHUP: Signal = 1;
pub const SIGINT: Signal = 2;
pub const SIGQUIT: Signal = 3;
pub const SIGILL: Signal = 4;
pub const SIGTRAP: Signal = 5;
pub const SIGABRT: Signal = 6;
pub const SIGBUS: Signal = 7;
pub const SIGFPE: Signal = 8;
pub const SIGKILL: Signal = 9;
pub const SIGUSR1: Signal = 10;
pub const SIGSEGV: Signal = 11;
pub const SIGUSR2: Signal = 12;
pub const SIGPIPE: Signal = 13;
pub const SIGALRM: Signal = 14;
pub const SIGTERM: Signal = 15;
pub const SIGCHLD: Signal = 16;
pub const SIGCONT: Signal = 17;
pub const SIGSTOP: Signal = 18;
pub const SIGTSTP: Signal = 19;
pub const SIGTTIN: Signal = 20;
pub const SIGTTOU: Signal = 21;
pub const SIGURG: Signal = 22;
pub const SIGXCPU: Signal = 24;
pub const SIGXFSZ: Signal = 25;
pub const SIGVTALRM: Signal = 26;
pub const SIGPROF: Signal = 27;
pub const SIGWINCH: Signal = 28;
pub const SIGIO: Signal = 29;
pub const SIGPWR: Signal = 30;
pub const SIGSYS: Signal = 31;

/// Number of signal slots (bit 0 unused).
pub const NSIG: usize = 32;

pub fn is_valid(sig: i64) -> bool {
    (1..NSIG as i64).contains(&sig)
}

/// Fatal by default: terminate with `128 + sig`.
pub fn is_fatal_by_default(sig: Signal) -> bool {
    matches!(sig, SIGKILL | SIGTERM)
}

/// Signals that cannot be masked, ignored or caught.
pub fn is_uncatchable(sig: Signal) -> bool {
    sig == SIGKILL
}

pub fn name(sig: Signal) -> &'static str {
    match sig {
        SIGHUP => "SIGHUP",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGILL => "SIGILL",
        SIGTRAP => "SIGTRAP",
        SIGABRT => "SIGABRT",
        SIGBUS => "SIGBUS",
        SIGFPE => "SIGFPE",
        SIGKILL => "SIGKILL",
        SIGUSR1 => "SIGUSR1",
        SIGSEGV => "SIGSEGV",
        SIGUSR2 => "SIGUSR2",
        SIGPIPE => "SIGPIPE",
        SIGALRM => "SIGALRM",
        SIGTERM => "SIGTERM",
        SIGCHLD => "SIGCHLD",
        SIGCONT => "SIGCONT",
        SIGSTOP => "SIGSTOP",
        SIGTSTP => "SIGTSTP",
        SIGTTIN => "SIGTTIN",
        SIGTTOU => "SIGTTOU",
        SIGURG => "SIGURG",
        SIGXCPU => "SIGXCPU",
        SIGXFSZ => "SIGXFSZ",
        SIGVTALRM => "SIGVTALRM",
        SIGPROF => "SIGPROF",
        SIGWINCH => "SIGWINCH",
        SIGIO => "SIGIO",
        SIGPWR => "SIGPWR",
        SIGSYS => "SIGSYS",
        _ => "SIG?",
    }
}

/// What to do when a signal is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalAction {
    #[default]
    Default,
    Ignore,
    /// Enter the process's program at this word address.
    Handler(i64),
}

/// The outcome of delivering one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Terminate(Signal),
    Handle(Signal, i64),
    Discard(Signal),
}

/// Pending bits, mask and installed actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalState {
    pending: u32,
    mask: u32,
    actions: [SignalAction; NSIG],
}

impl Default for SignalState {
    fn default() -> Self {
        Self {
            pending: 0,
            mask: 0,
            actions: [SignalAction::Default; NSIG],
        }
    }
}

impl SignalState {
    /// Mark `sig` pending unless it is masked. Returns whether it was queued.
    pub fn send(&mut self, sig: Signal) -> bool {
        if sig == 0 || sig as usize >= NSIG {
            return false;
        }
        let bit = 1u32 << sig;
        if self.mask & bit != 0 {
            return false;
        }
        self.pending |= bit;
        true
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn has_pending(&self) -> bool {
        self.pending != 0
    }

    pub fn is_pending(&self, sig: Signal) -> bool {
        self.pending & (1 << sig) != 0
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Replace the mask. SIGKILL can never be blocked. Returns the old mask.
    pub fn set_mask(&mut self, mask: u32) -> u32 {
        let old = self.mask;
        self.mask = mask & !(1 << SIGKILL) & !1;
        old
    }

    pub fn action(&self, sig: Signal) -> SignalAction {
        self.actions.get(sig as usize).copied().unwrap_or_default()
    }

    /// Install an action. Fails for SIGKILL and out-of-range numbers.
    pub fn set_action(&mut self, sig: Signal, action: SignalAction) -> bool {
        if is_uncatchable(sig) || sig == 0 || sig as usize >= NSIG {
            return false;
        }
        self.actions[sig as usize] = action;
        true
    }

    /// Drain every pending signal in ascending order, stopping at the
    /// first that terminates the process.
    pub fn drain(&mut self) -> Vec<Disposition> {
        let mut out = Vec::new();
        for sig in 1..NSIG as Signal {
            let bit = 1u32 << sig;
            if self.pending & bit == 0 {
                continue;
            }
            self.pending &= !bit;
            let disposition = match self.actions[sig as usize] {
                _ if is_uncatchable(sig) => Disposition::Terminate(sig),
                SignalAction::Ignore => Disposition::Discard(sig),
                SignalAction::Handler(addr) => Disposition::Handle(sig, addr),
                SignalAction::Default if is_fatal_by_default(sig) => Disposition::Terminate(sig),
                SignalAction::Default => Disposition::Discard(sig),
            };
            let fatal = matches!(disposition, Disposition::Terminate(_));
            out.push(disposition);
            if fatal {
                break;
            }
        }
        out
    }

    /// Drop installed handlers (ignored signals stay ignored), as on exec.
    pub fn reset_actions(&mut self) {
        for action in self.actions.iter_mut() {
            if let SignalAction::Handler(_) = action {
                *action = SignalAction::Default;
            }
        }
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending={:#010x} mask={:#010x}", self.pending, self.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_ascending_order() {
        let mut s = SignalState::default();
        s.send(SIGUSR2);
        s.send(SIGHUP);
        s.send(SIGCHLD);
        assert_eq!(
            s.drain(),
            vec![Disposition::Discard(SIGHUP), Disposition::Discard(SIGUSR2), Disposition::Discard(SIGCHLD)]
        );
        assert!(!s.has_pending());
    }

    #[test]
    fn test_fatal_stops_drain() {
        let mut s = SignalState::default();
        s.send(SIGKILL);
        s.send(SIGTERM);
        assert_eq!(s.drain(), vec![Disposition::Terminate(SIGKILL)]);
        assert!(s.is_pending(SIGTERM));
    }

    #[test]
    fn test_mask_and_actions() {
        let mut s = SignalState::default();
        s.set_mask(u32::MAX);
        assert!(!s.send(SIGTERM));
        assert!(s.send(SIGKILL));
        assert!(!s.set_action(SIGKILL, SignalAction::Ignore));
        assert!(s.set_action(SIGTERM, SignalAction::Handler(40)));
        s.set_mask(0);
        s.send(SIGTERM);
        assert_eq!(s.drain(), vec![Disposition::Terminate(SIGKILL)]);
        assert_eq!(s.drain(), vec![Disposition::Handle(SIGTERM, 40)]);
    }

    #[test]
    fn test_only_sigkill_is_unmaskable() {
        let mut s = SignalState::default();
        s.set_mask(u32::MAX);
        assert_eq!(s.mask() & (1 << SIGKILL), 0);
        assert_ne!(s.mask() & (1 << SIGSTOP), 0);
        assert!(!s.send(SIGSTOP));
        assert!(is_uncatchable(SIGKILL));
        assert!(!is_uncatchable(SIGSTOP));
        assert!(s.set_action(SIGSTOP, SignalAction::Ignore));
    }

    #[test]
    fn test_ignored_term_is_discarded() {
        let mut s = SignalState::default();
        s.set_action(SIGTERM, SignalAction::Ignore);
        s.send(SIGTERM);
        assert_eq!(s.drain(), vec![Disposition::Discard(SIGTERM)]);
    }
}
