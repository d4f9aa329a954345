//! File descriptors and pipes.
//!
//! A process starts with an empty table; writes to fd 1 and 2 without an
//! entry go to the console. Pipes are reference counted by the descriptors
//! that name their ends and disappear when both counts reach zero.

use std::collections::{BTreeMap, VecDeque};

/// Descriptors per process.
pub const MAX_FDS: usize = 16;
/// Bytes a pipe buffers before writes become partial.
pub const PIPE_CAPACITY: usize = 4096;

pub type PipeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdEntry {
    Console,
    PipeRead(PipeId),
    PipeWrite(PipeId),
}

/// A descriptor number outside the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadDescriptor(pub i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdTable {
    slots: Vec<Option<FdEntry>>,
}

impl Default for FdTable {
    fn default() -> Self {
        Self { slots: vec![None; MAX_FDS] }
    }
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(fd: i64) -> Option<usize> {
        usize::try_from(fd).ok().filter(|&i| i < MAX_FDS)
    }

    pub fn get(&self, fd: i64) -> Option<FdEntry> {
        Self::slot(fd).and_then(|i| self.slots[i])
    }

    /// Install at the lowest free descriptor.
    pub fn install(&mut self, entry: FdEntry) -> Option<i64> {
        let i = self.slots.iter().position(Option::is_none)?;
        self.slots[i] = Some(entry);
        Some(i as i64)
    }

    /// Install at `fd`, returning whatever it replaced.
    pub fn install_at(&mut self, fd: i64, entry: FdEntry) -> Result<Option<FdEntry>, BadDescriptor> {
        let i = Self::slot(fd).ok_or(BadDescriptor(fd))?;
        Ok(self.slots[i].replace(entry))
    }

    pub fn remove(&mut self, fd: i64) -> Option<FdEntry> {
        Self::slot(fd).and_then(|i| self.slots[i].take())
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> Vec<FdEntry> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (i64, FdEntry)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|e| (i as i64, e)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of reading a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeRead {
    Data(Vec<u8>),
    /// Empty, but writers remain.
    WouldBlock,
    /// Empty and no writers left.
    Eof,
}

#[derive(Debug, Clone, Default)]
struct Pipe {
    buf: VecDeque<u8>,
    readers: usize,
    writers: usize,
}

/// Every pipe in the system.
#[derive(Debug, Clone, Default)]
pub struct PipeTable {
    pipes: BTreeMap<PipeId, Pipe>,
    next_id: PipeId,
}

impl PipeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new pipe with one reader and one writer.
    pub fn create(&mut self) -> PipeId {
        self.next_id += 1;
        let id = self.next_id;
        self.pipes.insert(id, Pipe { buf: VecDeque::new(), readers: 1, writers: 1 });
        id
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    pub fn buffered(&self, id: PipeId) -> usize {
        self.pipes.get(&id).map_or(0, |p| p.buf.len())
    }

    pub fn has_readers(&self, id: PipeId) -> bool {
        self.pipes.get(&id).is_some_and(|p| p.readers > 0)
    }

    pub fn read(&mut self, id: PipeId, max: usize) -> PipeRead {
        let Some(pipe) = self.pipes.get_mut(&id) else {
            return PipeRead::Eof;
        };
        if pipe.buf.is_empty() {
            return if pipe.writers > 0 { PipeRead::WouldBlock } else { PipeRead::Eof };
        }
        let n = max.min(pipe.buf.len());
        PipeRead::Data(pipe.buf.drain(..n).collect())
    }

    /// Buffer as much of `data` as fits. Returns the bytes accepted.
    pub fn write(&mut self, id: PipeId, data: &[u8]) -> usize {
        let Some(pipe) = self.pipes.get_mut(&id) else {
            return 0;
        };
        let n = data.len().min(PIPE_CAPACITY - pipe.buf.len());
        pipe.buf.extend(&data[..n]);
        n
    }

    /// Another descriptor now names this end.
    pub fn add_ref(&mut self, entry: FdEntry) {
        match entry {
            FdEntry::PipeRead(id) => {
                if let Some(p) = self.pipes.get_mut(&id) {
                    p.readers += 1;
                }
            }
            FdEntry::PipeWrite(id) => {
                if let Some(p) = self.pipes.get_mut(&id) {
                    p.writers += 1;
                }
            }
            FdEntry::Console => {}
        }
    }

    /// A descriptor naming this end was closed.
    pub fn drop_ref(&mut self, entry: FdEntry) {
        let id = match entry {
            FdEntry::PipeRead(id) | FdEntry::PipeWrite(id) => id,
            FdEntry::Console => return,
        };
        let Some(p) = self.pipes.get_mut(&id) else { return };
        match entry {
            FdEntry::PipeRead(_) => p.readers = p.readers.saturating_sub(1),
            _ => p.writers = p.writers.saturating_sub(1),
        }
        if p.readers == 0 && p.writers == 0 {
            self.pipes.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fd_allocation() {
        let mut fds = FdTable::new();
        assert_eq!(fds.install(FdEntry::Console), Some(0));
        assert_eq!(fds.install(FdEntry::Console), Some(1));
        fds.remove(0);
        assert_eq!(fds.install(FdEntry::PipeRead(1)), Some(0));
        assert_eq!(fds.install_at(5, FdEntry::Console), Ok(None));
        assert_eq!(fds.install_at(5, FdEntry::PipeWrite(1)), Ok(Some(FdEntry::Console)));
        assert!(fds.install_at(16, FdEntry::Console).is_err());
        assert_eq!(fds.len(), 3);
        assert_eq!(fds.drain().len(), 3);
        assert!(fds.is_empty());
    }

    #[test]
    fn test_pipe_flow() {
        let mut pipes = PipeTable::new();
        let id = pipes.create();
        assert_eq!(pipes.read(id, 4), PipeRead::WouldBlock);
        assert_eq!(pipes.write(id, b"hello"), 5);
        assert_eq!(pipes.read(id, 3), PipeRead::Data(b"hel".to_vec()));
        pipes.drop_ref(FdEntry::PipeWrite(id));
        assert_eq!(pipes.read(id, 10), PipeRead::Data(b"lo".to_vec()));
        assert_eq!(pipes.read(id, 10), PipeRead::Eof);
        pipes.drop_ref(FdEntry::PipeRead(id));
        assert!(pipes.is_empty());
    }

    #[test]
    fn test_pipe_capacity() {
        let mut pipes = PipeTable::new();
        let id = pipes.create();
        let big = vec![7u8; PIPE_CAPACITY + 10];
        assert_eq!(pipes.write(id, &big), PIPE_CAPACITY);
        assert_eq!(pipes.write(id, b"x"), 0);
        assert_eq!(pipes.buffered(id), PIPE_CAPACITY);
    }
}
