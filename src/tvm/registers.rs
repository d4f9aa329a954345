//! T3 register file.
//!
//! Sixteen 27-trit registers:
//! - r0..r11: general purpose (r0 carries the syscall number and status,
//!   r1..r6 the syscall arguments, r7 the scalar syscall result)
//! - CR (r12): condition register
//! - LR (r13): link register for call/return and syscall return
//! - SP (r14): stack pointer (word address)
//! - PC (r15): program counter (word address)

use serde::{Serialize, Deserialize};
use crate::ternary::{Trit, Word};

/// Number of registers in the file.
pub const T3_REGISTER_COUNT: usize = 16;

/// Condition register index.
pub const CR: usize = 12;
/// Link register index.
pub const LR: usize = 13;
/// Stack pointer index.
pub const SP: usize = 14;
/// Program counter index.
pub const PC: usize = 15;

/// Register receiving the syscall status trit.
pub const R_STATUS: usize = 0;
/// First syscall argument register (args occupy r1..=r6).
pub const R_ARG0: usize = 1;
/// Register receiving a syscall's scalar result.
pub const R_RESULT: usize = 7;

/// The register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    regs: [Word; T3_REGISTER_COUNT],
}

impl Registers {
    /// Create a register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        self.regs = [Word::zero(); T3_REGISTER_COUNT];
    }

    /// Read register `index`, `None` if the index is not < `T3_REGISTER_COUNT`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Word> {
        self.regs.get(index).copied()
    }

    /// Write register `index`. Returns false if the index is out of range.
    #[inline]
    pub fn set(&mut self, index: usize, value: Word) -> bool {
        match self.regs.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Read a register as an integer (0 for a bad index).
    pub fn value(&self, index: usize) -> i64 {
        self.get(index).map(|w| w.to_i64()).unwrap_or(0)
    }

    /// Write an integer into a register, saturating into the word range.
    pub fn set_value(&mut self, index: usize, value: i64) -> bool {
        self.set(index, Word::from_i64_saturating(value))
    }

    /// Write a trit into a register, widened to a word.
    pub fn set_trit(&mut self, index: usize, value: Trit) -> bool {
        self.set(index, Word::from_trit(value))
    }

    pub fn pc(&self) -> i64 {
        self.value(PC)
    }

    pub fn set_pc(&mut self, addr: i64) {
        self.set_value(PC, addr);
    }

    /// Increment the program counter by 1, returning the old value.
    pub fn advance_pc(&mut self) -> i64 {
        let old = self.pc();
        self.set_pc(old + 1);
        old
    }

    pub fn sp(&self) -> i64 {
        self.value(SP)
    }

    pub fn set_sp(&mut self, addr: i64) {
        self.set_value(SP, addr);
    }

    pub fn lr(&self) -> i64 {
        self.value(LR)
    }

    pub fn set_lr(&mut self, addr: i64) {
        self.set_value(LR, addr);
    }

    /// The condition register as a trit.
    pub fn cr(&self) -> Trit {
        self.regs[CR].to_trit()
    }

    pub fn set_cr(&mut self, value: Trit) {
        self.set_trit(CR, value);
    }

    /// Conventional register name.
    pub fn name(index: usize) -> String {
        match index {
            CR => "cr".into(),
            LR => "lr".into(),
            SP => "sp".into(),
            PC => "pc".into(),
            i => format!("r{}", i),
        }
    }

    /// Parse a register name (`r0`..`r15`, `cr`, `lr`, `sp`, `pc`).
    pub fn parse_name(name: &str) -> Option<usize> {
        match name.to_ascii_lowercase().as_str() {
            "cr" => Some(CR),
            "lr" => Some(LR),
            "sp" => Some(SP),
            "pc" => Some(PC),
            other => other
                .strip_prefix('r')
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|&n| n < T3_REGISTER_COUNT),
        }
    }

    /// Iterate over (index, value).
    pub fn iter(&self) -> impl Iterator<Item = (usize, Word)> + '_ {
        self.regs.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let mut regs = Registers::new();
        assert!(regs.get(T3_REGISTER_COUNT).is_none());
        assert!(!regs.set(T3_REGISTER_COUNT, Word::zero()));
    }

    #[test]
    fn test_advance_pc() {
        let mut regs = Registers::new();
        regs.set_pc(10);
        assert_eq!(regs.advance_pc(), 10);
        assert_eq!(regs.pc(), 11);
    }

    #[test]
    fn test_names() {
        for i in 0..T3_REGISTER_COUNT {
            assert_eq!(Registers::parse_name(&Registers::name(i)), Some(i));
        }
        assert_eq!(Registers::parse_name("R3"), Some(3));
        assert_eq!(Registers::parse_name("r16"), None);
    }

    #[test]
    fn test_cr_trit() {
        let mut regs = Registers::new();
        regs.set_cr(Trit::N);
        assert_eq!(regs.cr(), Trit::N);
    }
}
