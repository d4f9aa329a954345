//! Console sink for human-readable output.
//!
//! The `write` syscall on fd 1/2 and `console_puts` end up here. This is
//! separate from logging.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

pub trait Console {
    fn write_bytes(&mut self, bytes: &[u8]);

    fn puts(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

/// Writes straight to stdout.
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut out = std::io::stdout().lock();
        // Console output is best effort
        let _ = out.write_all(bytes);
        let _ = out.flush();
    }
}

/// Collects output in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.borrow().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.buf.borrow_mut().clear();
    }
}

impl Console for BufferConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.borrow_mut().extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console_shares_output() {
        let console = BufferConsole::new();
        let mut sink: Box<dyn Console> = Box::new(console.clone());
        sink.puts("hello ");
        sink.write_bytes(b"world");
        assert_eq!(console.text(), "hello world");
        console.clear();
        assert!(console.contents().is_empty());
    }
}
