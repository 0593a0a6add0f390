//! Fan-out writer for accessory output
//!
//! Every write is captured in memory and then forwarded to each attached
//! sink in order. Sinks are best-effort: the first error from a sink is
//! logged and that sink is skipped from then on, while the capture and the
//! remaining sinks keep receiving data.
//!
//! The capture lives behind a [`Capture`] handle so it can still be read
//! while the tee itself is busy on another thread.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared view of everything a [`Tee`] has captured
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    /// Copy of the bytes captured so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Sink {
    name: String,
    writer: Box<dyn Write + Send>,
    healthy: bool,
}

/// Captures output and duplicates it into a list of sinks
pub struct Tee {
    capture: Capture,
    sinks: Vec<Sink>,
}

impl Tee {
    pub fn new() -> Self {
        Self {
            capture: Capture::default(),
            sinks: Vec::new(),
        }
    }

    /// Attach a sink; sinks receive writes in the order they were attached
    pub fn with_sink(mut self, name: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        self.sinks.push(Sink {
            name: name.into(),
            writer: Box::new(writer),
            healthy: true,
        });
        self
    }

    /// Handle that keeps seeing writes after the tee is moved away
    pub fn capture(&self) -> Capture {
        self.capture.clone()
    }

    /// Everything written so far
    pub fn captured(&self) -> Vec<u8> {
        self.capture.snapshot()
    }

    /// Consume the tee, flushing the sinks and returning the capture
    pub fn into_captured(mut self) -> Vec<u8> {
        let _ = self.flush();
        self.capture.snapshot()
    }
}

impl Default for Tee {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.capture.lock().extend_from_slice(buf);
        for sink in self.sinks.iter_mut().filter(|s| s.healthy) {
            if let Err(e) = sink.writer.write_all(buf) {
                tracing::warn!(sink = %sink.name, error = %e, "dropping output sink after write error");
                sink.healthy = false;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in self.sinks.iter_mut().filter(|s| s.healthy) {
            if let Err(e) = sink.writer.flush() {
                tracing::warn!(sink = %sink.name, error = %e, "dropping output sink after flush error");
                sink.healthy = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shared buffer so the test can inspect what a sink received
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails after accepting `budget` writes
    struct Flaky {
        budget: usize,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("disk full"));
            }
            self.budget -= 1;
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_reach_capture_and_sinks_in_order() {
        let a = SharedBuf::default();
        let b = SharedBuf::default();
        let mut tee = Tee::new().with_sink("a", a.clone()).with_sink("b", b.clone());

        tee.write_all(b"out 1\n").unwrap();
        tee.write_all(b"err 1\n").unwrap();
        tee.write_all(b"out 2\n").unwrap();

        let expected = b"out 1\nerr 1\nout 2\n".to_vec();
        assert_eq!(tee.captured(), expected);
        assert_eq!(*a.0.lock().unwrap(), expected);
        assert_eq!(*b.0.lock().unwrap(), expected);
        assert_eq!(tee.into_captured(), expected);
    }

    #[test]
    fn test_failing_sink_is_skipped() {
        let healthy = SharedBuf::default();
        let mut tee = Tee::new()
            .with_sink("flaky", Flaky { budget: 1 })
            .with_sink("healthy", healthy.clone());

        tee.write_all(b"one ").unwrap();
        tee.write_all(b"two ").unwrap();
        tee.write_all(b"three").unwrap();

        assert_eq!(tee.captured(), b"one two three");
        assert_eq!(*healthy.0.lock().unwrap(), b"one two three".to_vec());
        assert!(!tee.sinks[0].healthy);
        assert!(tee.sinks[1].healthy);
    }

    #[test]
    fn test_capture_handle_outlives_tee_on_another_thread() {
        let mut tee = Tee::new();
        let capture = tee.capture();

        std::thread::spawn(move || {
            tee.write_all(b"partial ").unwrap();
            tee.write_all(b"output").unwrap();
            // The tee is dropped here without into_captured
        })
        .join()
        .unwrap();

        assert_eq!(capture.snapshot(), b"partial output".to_vec());
    }

    #[test]
    fn test_no_sinks_still_captures() {
        let mut tee = Tee::default();
        write!(tee, "hello {}", 42).unwrap();
        assert_eq!(tee.into_captured(), b"hello 42".to_vec());
    }
}
