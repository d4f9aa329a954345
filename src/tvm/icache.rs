//! Direct-mapped instruction cache.
//!
//! Caches decoded instructions by word address. Slot for address `a` is
//! `a & (size - 1)`; a slot holds at most one entry, whose tag is the full
//! address. The cache is never written through: stores into code must
//! flush it.

use serde::{Serialize, Deserialize};
use crate::tvm::decode::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CacheEntry {
    address: usize,
    instr: Instruction,
}

/// A direct-mapped cache of decoded instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ICache {
    entries: Vec<Option<CacheEntry>>,
    mask: usize,
}

impl ICache {
    /// Create a cache with `size` slots. `size` is rounded up to a power of two.
    pub fn new(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();
        Self {
            entries: vec![None; size],
            mask: size - 1,
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn slot(&self, address: usize) -> usize {
        address & self.mask
    }

    /// Cached instruction for `address`, if the slot's tag matches.
    pub fn lookup(&self, address: usize) -> Option<Instruction> {
        match self.entries[self.slot(address)] {
            Some(entry) if entry.address == address => Some(entry.instr),
            _ => None,
        }
    }

    /// Install a decoded instruction, evicting whatever held the slot.
    pub fn install(&mut self, address: usize, instr: Instruction) {
        let slot = self.slot(address);
        self.entries[slot] = Some(CacheEntry { address, instr });
    }

    /// Drop the entry for `address`, if cached.
    pub fn invalidate(&mut self, address: usize) {
        let slot = self.slot(address);
        if matches!(self.entries[slot], Some(e) if e.address == address) {
            self.entries[slot] = None;
        }
    }

    /// Drop every entry.
    pub fn flush(&mut self) {
        self.entries.fill(None);
    }

    /// Number of valid entries.
    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Every valid entry sits in the slot its address maps to.
    pub fn is_consistent(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(slot, e)| e.map_or(true, |e| e.address & self.mask == slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::decode::Opcode;

    #[test]
    fn test_hit_miss_and_eviction() {
        let mut cache = ICache::new(4);
        let nop = Instruction::bare(Opcode::Nop);
        let halt = Instruction::halt();

        assert_eq!(cache.lookup(1), None);
        cache.install(1, nop);
        assert_eq!(cache.lookup(1), Some(nop));

        // 5 maps to the same slot as 1
        cache.install(5, halt);
        assert_eq!(cache.lookup(1), None);
        assert_eq!(cache.lookup(5), Some(halt));
        assert_eq!(cache.occupied(), 1);
        assert!(cache.is_consistent());
    }

    #[test]
    fn test_size_rounds_to_power_of_two() {
        assert_eq!(ICache::new(0).size(), 1);
        assert_eq!(ICache::new(48).size(), 64);
    }

    #[test]
    fn test_invalidate_and_flush() {
        let mut cache = ICache::new(8);
        cache.install(2, Instruction::halt());
        cache.install(3, Instruction::halt());
        cache.invalidate(10);
        assert_eq!(cache.occupied(), 2);
        cache.invalidate(2);
        assert_eq!(cache.occupied(), 1);
        cache.flush();
        assert_eq!(cache.occupied(), 0);
    }
}
