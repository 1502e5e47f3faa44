use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Line writer shared by the input loop and the gateway event tasks.
///
/// Each call writes its whole block under the lock, so a message rendered by
/// an event task never lands in the middle of a listing.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    failed: Arc<AtomicBool>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = writeln!(out, "{}", text.as_ref()).and_then(|()| out.flush());
        self.check(result);
    }

    /// Writes `text` as-is; callers include their own trailing newline.
    pub fn block(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = out.write_all(text.as_bytes()).and_then(|()| out.flush());
        self.check(result);
    }

    /// Only the first failure is logged; a closed terminal fails every write.
    fn check(&self, result: io::Result<()>) {
        if let Err(error) = result {
            if !self.failed.swap(true, Ordering::Relaxed) {
                warn!(%error, "console output failed");
            }
        }
    }

    #[cfg(test)]
    pub fn capture() -> (Self, Captured) {
        let captured = Captured::default();
        (Self::from_writer(captured.clone()), captured)
    }
}

#[cfg(test)]
#[derive(Clone, Default)]
pub struct Captured {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl Captured {
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().expect("capture buffer");
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn clear(&self) {
        self.buffer.lock().expect("capture buffer").clear();
    }
}

#[cfg(test)]
impl Write for Captured {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.lock().expect("capture buffer").extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _data: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn capture_collects_lines_and_blocks() {
        let (console, out) = Console::capture();
        console.line("one");
        console.block("two\n");
        assert_eq!(out.lines(), vec!["one", "two"]);
        assert!(!console.failed.load(Ordering::Relaxed));
    }

    #[test]
    fn write_failures_are_flagged_once() {
        let console = Console::from_writer(ClosedPipe);
        console.line("lost");
        assert!(console.failed.load(Ordering::Relaxed));

        let clone = console.clone();
        clone.block("also lost");
        assert!(clone.failed.load(Ordering::Relaxed));
    }
}
