//! Deployment log sink.
//!
//! The sink is the only thing the deployment core knows about its caller's
//! presentation layer. Callers receive raw fragments as well as
//! newline-terminated lines and must not assume one call is one line.

use std::io::Write;

use parking_lot::Mutex;

/// Narrow capability for receiving deployment output.
pub trait LogSink: Send + Sync {
    /// Append a text fragment.
    fn write(&self, text: &str);

    /// Append a full line.
    fn writeln(&self, line: &str) {
        self.write(&format!("{}\n", line));
    }
}

/// Sink that prints to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            tracing::debug!("stdout sink write failed: {}", e);
        }
    }
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    buffer: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }

    /// Written text split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.buffer.lock().lines().map(str::to_string).collect()
    }
}

impl LogSink for BufferSink {
    fn write(&self, text: &str) {
        self.buffer.lock().push_str(text);
    }
}
