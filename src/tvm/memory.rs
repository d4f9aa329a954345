//! Trit memory.
//!
//! A bounded, byte-addressable array of trit cells. Every access is
//! bounds-checked: out-of-range reads yield `X` and out-of-range writes
//! change nothing. Block operations are all-or-nothing.
//!
//! The TVM views the same cells as consecutive 27-trit [`Word`]s; word
//! `w` occupies cells `w * 27 .. w * 27 + 27`.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::ternary::{Trit, Word};

/// Trits per memory word.
pub const WORD_TRITS: usize = Word::WIDTH;

/// A bounded trit store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TritMemory {
    cells: Vec<Trit>,
    read_only: bool,
    /// One past the highest address ever written.
    used: usize,
}

impl TritMemory {
    /// Create a zeroed memory of `size` trits.
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![Trit::O; size],
            read_only: false,
            used: 0,
        }
    }

    /// Create a zeroed memory holding `words` 27-trit words.
    pub fn with_words(words: usize) -> Self {
        Self::new(words * WORD_TRITS)
    }

    /// Size in trits.
    #[inline]
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Size in whole words.
    #[inline]
    pub fn words(&self) -> usize {
        self.cells.len() / WORD_TRITS
    }

    /// The used watermark.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn check_range(&self, addr: usize, n: usize) -> Result<(), MemoryError> {
        match addr.checked_add(n) {
            Some(end) if end <= self.cells.len() => Ok(()),
            _ => Err(MemoryError::OutOfRange { addr, len: n, size: self.cells.len() }),
        }
    }

    fn check_writable(&self, addr: usize, n: usize) -> Result<(), MemoryError> {
        if self.read_only {
            return Err(MemoryError::ReadOnly);
        }
        self.check_range(addr, n)
    }

    fn touch(&mut self, addr: usize, n: usize) {
        if n > 0 {
            self.used = self.used.max(addr + n);
        }
    }

    /// Read one cell. Out of range gives `X`.
    #[inline]
    pub fn read(&self, addr: usize) -> Trit {
        self.cells.get(addr).copied().unwrap_or(Trit::X)
    }

    /// Write one cell.
    pub fn write(&mut self, addr: usize, value: Trit) -> Result<(), MemoryError> {
        if !value.is_valid() {
            return Err(MemoryError::InvalidTrit(addr));
        }
        self.check_writable(addr, 1)?;
        self.cells[addr] = value;
        self.touch(addr, 1);
        Ok(())
    }

    /// Copy `buf.len()` cells starting at `addr` into `buf`.
    pub fn read_block(&self, addr: usize, buf: &mut [Trit]) -> Result<(), MemoryError> {
        self.check_range(addr, buf.len())?;
        buf.copy_from_slice(&self.cells[addr..addr + buf.len()]);
        Ok(())
    }

    /// Write `buf` starting at `addr`.
    pub fn write_block(&mut self, addr: usize, buf: &[Trit]) -> Result<(), MemoryError> {
        self.check_writable(addr, buf.len())?;
        if let Some(i) = buf.iter().position(|t| !t.is_valid()) {
            return Err(MemoryError::InvalidTrit(addr + i));
        }
        self.cells[addr..addr + buf.len()].copy_from_slice(buf);
        self.touch(addr, buf.len());
        Ok(())
    }

    /// Set `n` cells starting at `addr` to `value`.
    pub fn fill(&mut self, value: Trit, addr: usize, n: usize) -> Result<(), MemoryError> {
        if !value.is_valid() {
            return Err(MemoryError::InvalidTrit(addr));
        }
        self.check_writable(addr, n)?;
        self.cells[addr..addr + n].fill(value);
        self.touch(addr, n);
        Ok(())
    }

    /// Zero `n` cells starting at `addr`.
    pub fn clear(&mut self, addr: usize, n: usize) -> Result<(), MemoryError> {
        self.fill(Trit::O, addr, n)
    }

    /// Zero the whole memory and reset the watermark.
    pub fn reset(&mut self) {
        self.cells.fill(Trit::O);
        self.used = 0;
    }

    /// Copy `n` cells between two distinct memories.
    ///
    /// Overlap within one memory is only possible through [`TritMemory::move_within`].
    pub fn copy(
        dst: &mut TritMemory,
        dst_addr: usize,
        src: &TritMemory,
        src_addr: usize,
        n: usize,
    ) -> Result<(), MemoryError> {
        src.check_range(src_addr, n)?;
        dst.check_writable(dst_addr, n)?;
        dst.cells[dst_addr..dst_addr + n].copy_from_slice(&src.cells[src_addr..src_addr + n]);
        dst.touch(dst_addr, n);
        Ok(())
    }

    /// Move `n` cells within this memory; the ranges may overlap.
    pub fn move_within(&mut self, src_addr: usize, dst_addr: usize, n: usize) -> Result<(), MemoryError> {
        self.check_range(src_addr, n)?;
        self.check_writable(dst_addr, n)?;
        self.cells.copy_within(src_addr..src_addr + n, dst_addr);
        self.touch(dst_addr, n);
        Ok(())
    }

    /// First address at or after `from` holding `value`.
    pub fn find(&self, value: Trit, from: usize) -> Option<usize> {
        self.cells
            .get(from..)?
            .iter()
            .position(|&t| t == value)
            .map(|i| from + i)
    }

    /// First address at or after `from` where `pattern` occurs.
    pub fn find_array(&self, pattern: &[Trit], from: usize) -> Option<usize> {
        if pattern.is_empty() {
            return (from <= self.cells.len()).then_some(from);
        }
        self.cells
            .get(from..)?
            .windows(pattern.len())
            .position(|w| w == pattern)
            .map(|i| from + i)
    }

    /// Read word `index`.
    pub fn read_word(&self, index: usize) -> Result<Word, MemoryError> {
        let base = index
            .checked_mul(WORD_TRITS)
            .ok_or(MemoryError::WordOutOfRange(index))?;
        self.check_range(base, WORD_TRITS)
            .map_err(|_| MemoryError::WordOutOfRange(index))?;
        let mut trits = [Trit::O; WORD_TRITS];
        trits.copy_from_slice(&self.cells[base..base + WORD_TRITS]);
        Word::from_trits(trits).ok_or(MemoryError::InvalidTrit(base))
    }

    /// Write word `index`.
    pub fn write_word(&mut self, index: usize, value: Word) -> Result<(), MemoryError> {
        let base = index
            .checked_mul(WORD_TRITS)
            .ok_or(MemoryError::WordOutOfRange(index))?;
        if self.read_only {
            return Err(MemoryError::ReadOnly);
        }
        self.check_range(base, WORD_TRITS)
            .map_err(|_| MemoryError::WordOutOfRange(index))?;
        self.write_block(base, value.trits())
    }

    /// Load a program into memory starting at word `start`.
    pub fn load_program(&mut self, start: usize, program: &[Word]) -> Result<(), MemoryError> {
        let available = self.words().saturating_sub(start);
        if program.len() > available {
            return Err(MemoryError::ProgramTooLarge { size: program.len(), available });
        }
        for (i, &word) in program.iter().enumerate() {
            self.write_word(start + i, word)?;
        }
        Ok(())
    }

    /// Dump words (for debugging).
    pub fn dump_words(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.words());
        (start..end)
            .filter_map(|i| self.read_word(i).ok().map(|w| (i, w)))
            .collect()
    }
}

impl std::fmt::Debug for TritMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|t| !t.is_zero()).count();
        f.debug_struct("TritMemory")
            .field("non_zero_cells", &non_zero)
            .field("size", &self.cells.len())
            .field("used", &self.used)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("range {addr}+{len} exceeds memory of {size} trits")]
    OutOfRange { addr: usize, len: usize, size: usize },

    #[error("word address {0} out of range")]
    WordOutOfRange(usize),

    #[error("memory is read-only")]
    ReadOnly,

    #[error("invalid trit written at {0}")]
    InvalidTrit(usize),

    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_read_write() {
        let mut mem = TritMemory::new(16);
        mem.write(3, Trit::P).unwrap();
        assert_eq!(mem.read(3), Trit::P);
        assert_eq!(mem.used(), 4);
        assert!(mem.write(3, Trit::X).is_err());
    }

    #[test]
    fn test_read_only_guard() {
        let mut mem = TritMemory::new(8);
        mem.set_read_only(true);
        assert_eq!(mem.write(0, Trit::P), Err(MemoryError::ReadOnly));
        assert_eq!(mem.fill(Trit::N, 0, 8), Err(MemoryError::ReadOnly));
        assert_eq!(mem.read(0), Trit::O);
    }

    #[test]
    fn test_blocks_fill_find() {
        let mut mem = TritMemory::new(32);
        mem.write_block(4, &[Trit::P, Trit::N, Trit::P]).unwrap();
        mem.fill(Trit::N, 20, 3).unwrap();

        let mut buf = [Trit::O; 3];
        mem.read_block(4, &mut buf).unwrap();
        assert_eq!(buf, [Trit::P, Trit::N, Trit::P]);

        assert_eq!(mem.find(Trit::N, 0), Some(5));
        assert_eq!(mem.find(Trit::N, 6), Some(20));
        assert_eq!(mem.find_array(&[Trit::N, Trit::P], 0), Some(5));
        assert_eq!(mem.find_array(&[Trit::P, Trit::P], 0), None);
        assert_eq!(mem.find(Trit::P, 100), None);

        mem.clear(20, 3).unwrap();
        assert_eq!(mem.find(Trit::N, 6), None);
        assert!(mem.read_block(30, &mut buf).is_err());
    }

    #[test]
    fn test_copy_and_overlapping_move() {
        let mut a = TritMemory::new(10);
        let mut b = TritMemory::new(10);
        a.write_block(0, &[Trit::P, Trit::O, Trit::N]).unwrap();
        TritMemory::copy(&mut b, 5, &a, 0, 3).unwrap();
        assert_eq!(b.read(7), Trit::N);

        a.move_within(0, 1, 3).unwrap();
        assert_eq!([a.read(1), a.read(2), a.read(3)], [Trit::P, Trit::O, Trit::N]);
        assert!(TritMemory::copy(&mut b, 9, &a, 0, 3).is_err());
    }

    #[test]
    fn test_word_view() {
        let mut mem = TritMemory::with_words(4);
        let value = Word::try_from_i64(-123_456).unwrap();
        mem.write_word(2, value).unwrap();
        assert_eq!(mem.read_word(2), Ok(value));
        assert_eq!(mem.read_word(4), Err(MemoryError::WordOutOfRange(4)));
        assert!(mem.load_program(3, &[Word::zero(), Word::zero()]).is_err());
    }

    proptest! {
        #[test]
        fn prop_out_of_range_is_invalid_and_inert(size in 0usize..64, addr in 0usize..256) {
            let mut mem = TritMemory::new(size);
            let before = mem.clone();
            if addr >= size {
                prop_assert_eq!(mem.read(addr), Trit::X);
                prop_assert!(mem.write(addr, Trit::P).is_err());
                prop_assert_eq!(mem, before);
            } else {
                prop_assert_eq!(mem.read(addr), Trit::O);
            }
        }
    }
}
