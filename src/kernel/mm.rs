//! Physical memory: frame allocation and byte-addressed RAM.
//!
//! Addresses are byte offsets into [`PhysMemory`]. Frame 0 is reserved so
//! that address 0 never names an allocation.

use log::trace;
use thiserror::Error;

/// Page-granular allocator.
pub trait FrameAllocator {
    /// Allocate `n` contiguous frames. Returns the byte address of the first.
    fn alloc_pages(&mut self, n: usize) -> Option<usize>;

    /// Release `n` frames starting at `addr`.
    fn free_pages(&mut self, addr: usize, n: usize);

    fn frame_size(&self) -> usize;

    fn free_frames(&self) -> usize;

    fn alloc_page(&mut self) -> Option<usize> {
        self.alloc_pages(1)
    }

    fn free_page(&mut self, addr: usize) {
        self.free_pages(addr, 1);
    }
}

/// First-fit allocator over a bitmap of frames.
#[derive(Debug, Clone)]
pub struct BitmapAllocator {
    used: Vec<bool>,
    frame_size: usize,
}

impl BitmapAllocator {
    pub fn new(frames: usize, frame_size: usize) -> Self {
        let mut used = vec![false; frames.max(1)];
        used[0] = true;
        Self { used, frame_size }
    }

    pub fn frames(&self) -> usize {
        self.used.len()
    }

    pub fn is_used(&self, frame: usize) -> bool {
        self.used.get(frame).copied().unwrap_or(false)
    }
}

impl FrameAllocator for BitmapAllocator {
    fn alloc_pages(&mut self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        let mut run = 0;
        for frame in 1..self.used.len() {
            if self.used[frame] {
                run = 0;
                continue;
            }
            run += 1;
            if run == n {
                let first = frame + 1 - n;
                self.used[first..=frame].fill(true);
                trace!("alloc {} frame(s) at {}", n, first);
                return Some(first * self.frame_size);
            }
        }
        None
    }

    fn free_pages(&mut self, addr: usize, n: usize) {
        let first = addr / self.frame_size;
        let end = (first + n).min(self.used.len());
        if first == 0 || first >= end {
            return;
        }
        self.used[first..end].fill(false);
        trace!("free {} frame(s) at {}", n, first);
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn free_frames(&self) -> usize {
        self.used.iter().filter(|u| !**u).count()
    }
}

/// A run of frames owned by a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub addr: usize,
    pub pages: usize,
}

impl Region {
    pub fn len(&self, frame_size: usize) -> usize {
        self.pages * frame_size
    }
}

/// Byte-addressable RAM backing the frames.
#[derive(Debug, Clone)]
pub struct PhysMemory {
    bytes: Vec<u8>,
}

impl PhysMemory {
    pub fn new(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn range(&self, addr: usize, len: usize) -> Result<std::ops::Range<usize>, MmError> {
        if addr == 0 {
            return Err(MmError::NullPointer);
        }
        match addr.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(addr..end),
            _ => Err(MmError::OutOfRange { addr, len }),
        }
    }

    pub fn read(&self, addr: usize, len: usize) -> Result<&[u8], MmError> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), MmError> {
        let range = self.range(addr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read_str(&self, addr: usize, len: usize) -> Result<String, MmError> {
        let bytes = self.read(addr, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| MmError::InvalidUtf8 { addr })
    }

    /// Copy `len` bytes between regions (ranges may overlap).
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) -> Result<(), MmError> {
        let from = self.range(src, len)?;
        self.range(dst, len)?;
        self.bytes.copy_within(from, dst);
        Ok(())
    }

    pub fn zero(&mut self, addr: usize, len: usize) -> Result<(), MmError> {
        let range = self.range(addr, len)?;
        self.bytes[range].fill(0);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MmError {
    #[error("null pointer")]
    NullPointer,

    #[error("access of {len} bytes at {addr} is out of range")]
    OutOfRange { addr: usize, len: usize },

    #[error("bytes at {addr} are not UTF-8")]
    InvalidUtf8 { addr: usize },

    #[error("out of physical frames")]
    OutOfFrames,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_free() {
        let mut frames = BitmapAllocator::new(8, 16);
        assert_eq!(frames.free_frames(), 7);
        let a = frames.alloc_pages(3).unwrap();
        assert_eq!(a, 16);
        let b = frames.alloc_pages(2).unwrap();
        assert_eq!(b, 64);
        assert_eq!(frames.alloc_pages(3), None);
        frames.free_pages(a, 3);
        assert_eq!(frames.alloc_pages(3), Some(16));
        assert_eq!(frames.alloc_pages(0), None);
    }

    #[test]
    fn test_frame_zero_is_reserved() {
        let mut frames = BitmapAllocator::new(2, 16);
        assert_eq!(frames.alloc_page(), Some(16));
        assert_eq!(frames.alloc_page(), None);
        frames.free_page(0);
        assert!(frames.is_used(0));
    }

    #[test]
    fn test_phys_bounds() {
        let mut mem = PhysMemory::new(32);
        assert_eq!(mem.write(0, b"x"), Err(MmError::NullPointer));
        assert_eq!(mem.write(30, b"abc"), Err(MmError::OutOfRange { addr: 30, len: 3 }));
        mem.write(4, b"hello").unwrap();
        assert_eq!(mem.read_str(4, 5).unwrap(), "hello");
        mem.copy_within(4, 10, 5).unwrap();
        assert_eq!(mem.read(10, 5).unwrap(), b"hello");
        mem.zero(4, 5).unwrap();
        assert_eq!(mem.read(4, 5).unwrap(), &[0; 5]);
    }
}
