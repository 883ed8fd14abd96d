//! Destinations for `print`, `prexpr`, `prstr` and newline output.
//!
//! - Stdout: the default for hosts and the CLI
//! - Buffer: captured text for tests and embedding hosts
//! - Silent: discards everything
//!
//! Enum dispatch keeps the hot `prexpr` path free of vtable calls.

use std::io::Write;

use parking_lot::Mutex;

/// Writes straight to the process's stdout.
#[derive(Default)]
pub struct StdoutPrintHandler;

impl StdoutPrintHandler {
    pub fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout is not an interpreter fault.
        let _ = out.write_all(text.as_bytes());
    }

    pub fn flush(&self) {
        let _ = std::io::stdout().lock().flush();
    }
}

/// Accumulates output in memory.
#[derive(Default)]
pub struct BufferPrintHandler {
    buffer: Mutex<String>,
}

impl BufferPrintHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, text: &str) {
        self.buffer.lock().push_str(text);
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }

    /// Take the captured text, leaving the buffer empty.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.lock())
    }
}

/// Output sink used by the interpreter.
pub enum PrintHandlerImpl {
    Stdout(StdoutPrintHandler),
    Buffer(BufferPrintHandler),
    Silent,
}

impl PrintHandlerImpl {
    pub fn write(&self, text: &str) {
        match self {
            Self::Stdout(h) => h.write(text),
            Self::Buffer(h) => h.write(text),
            Self::Silent => {}
        }
    }

    pub fn newline(&self) {
        self.write("\n");
    }

    /// Flush pending output at the end of a top-level statement.
    pub fn flush(&self) {
        if let Self::Stdout(h) = self {
            h.flush();
        }
    }

    /// Captured output; empty for handlers that do not capture.
    pub fn contents(&self) -> String {
        match self {
            Self::Buffer(h) => h.contents(),
            Self::Stdout(_) | Self::Silent => String::new(),
        }
    }

    /// Take captured output; empty for handlers that do not capture.
    pub fn take(&self) -> String {
        match self {
            Self::Buffer(h) => h.take(),
            Self::Stdout(_) | Self::Silent => String::new(),
        }
    }
}

/// Shared print handler; hosts keep a clone to read captured output.
pub type SharedPrintHandler = std::sync::Arc<PrintHandlerImpl>;

pub fn stdout_handler() -> SharedPrintHandler {
    std::sync::Arc::new(PrintHandlerImpl::Stdout(StdoutPrintHandler))
}

pub fn buffer_handler() -> SharedPrintHandler {
    std::sync::Arc::new(PrintHandlerImpl::Buffer(BufferPrintHandler::new()))
}

pub fn silent_handler() -> SharedPrintHandler {
    std::sync::Arc::new(PrintHandlerImpl::Silent)
}
