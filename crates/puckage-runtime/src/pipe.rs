use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Shared destination for installer output.
///
/// Cloning shares the underlying writer. Forwarding writes and flushes but
/// never drops the writer, so one sink can serve many invocations.
#[derive(Clone)]
pub struct Sink {
    inner: Arc<Mutex<dyn Write + Send>>,
}

impl Sink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|e| io::Error::other(format!("sink mutex poisoned: {e}")))?;
        writer.write_all(buf)
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut writer = self
            .inner
            .lock()
            .map_err(|e| io::Error::other(format!("sink mutex poisoned: {e}")))?;
        writer.flush()
    }

    /// True if both handles share one writer.
    pub fn same_as(&self, other: &Sink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

impl From<CaptureBuffer> for Sink {
    fn from(buffer: CaptureBuffer) -> Self {
        Sink::new(buffer)
    }
}

/// In-memory writer for collecting installer output.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        self.bytes
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.lock().map_or(true, |b| b.is_empty())
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|e| io::Error::other(format!("capture mutex poisoned: {e}")))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where a handle streams installer output, and whether that survives the
/// invocation that uses it.
#[derive(Debug, Clone, Default)]
pub struct PipeConfig {
    pub stdout: Option<Sink>,
    pub stderr: Option<Sink>,
    pub persistent: bool,
}

impl PipeConfig {
    pub fn new(stdout: Option<Sink>, stderr: Option<Sink>, persistent: bool) -> Self {
        Self {
            stdout,
            stderr,
            persistent,
        }
    }

    /// No sinks configured.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }

    /// Configuration left on the handle once an invocation has exited.
    #[must_use]
    pub fn after_exit(&self) -> Self {
        if self.persistent {
            self.clone()
        } else {
            Self::default()
        }
    }

    /// Snapshot handed to a dependency handle. Any configured sink makes the
    /// snapshot persistent, since the dependency handle outlives this call.
    #[must_use]
    pub fn inherited(&self) -> Self {
        let mut snapshot = self.clone();
        if !snapshot.is_empty() {
            snapshot.persistent = true;
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_shares_writer_across_clones() {
        let buffer = CaptureBuffer::new();
        let sink = Sink::from(buffer.clone());
        let clone = sink.clone();

        sink.write_all(b"foo ").unwrap();
        clone.write_all(b"bar").unwrap();
        clone.flush().unwrap();

        assert_eq!(buffer.contents(), "foo bar");
        assert!(sink.same_as(&clone));
        assert!(!sink.same_as(&Sink::new(Vec::new())));
    }

    #[test]
    fn non_persistent_resets_after_exit() {
        let sink = Sink::new(io::sink());
        let config = PipeConfig::new(Some(sink.clone()), Some(sink), false);
        let after = config.after_exit();
        assert!(after.is_empty());
        assert!(!after.persistent);
    }

    #[test]
    fn persistent_survives_exit() {
        let sink = Sink::new(io::sink());
        let config = PipeConfig::new(Some(sink.clone()), None, true);
        let after = config.after_exit();
        assert!(after.stdout.as_ref().is_some_and(|s| s.same_as(&sink)));
        assert!(after.stderr.is_none());
        assert!(after.persistent);
    }

    #[test]
    fn inherited_forces_persistence_only_with_sinks() {
        let with_sink = PipeConfig::new(None, Some(Sink::new(io::sink())), false);
        assert!(with_sink.inherited().persistent);

        let empty = PipeConfig::default();
        assert!(!empty.inherited().persistent);
    }
}
