//! Serialized terminal output.
//!
//! The input loop and the inbound delivery task both print. Each print is
//! one locked sequence: clear the current line, write the line, reprint the
//! prompt. Lines from the two paths may interleave but never tear.

use std::io::{Stdout, Write};
use std::sync::Mutex;

use murmur_signal::MessagePayload;

/// Shown whenever the session is waiting for input.
pub const PROMPT: &str = "Enter your message: ";

/// Erase the whole line and return the cursor to column one.
pub const CLEAR_LINE: &str = "\u{1b}[2K\u{1b}[G";

pub struct Console<W> {
    out: Mutex<W>,
}

impl Console<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn frame(&self, line: Option<&str>) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        // Terminal write failures have nowhere better to go.
        let _ = write_frame(&mut *out, line);
    }

    /// Reprint the prompt.
    pub fn prompt(&self) {
        self.frame(None);
    }

    /// Informational line.
    pub fn notice(&self, message: &str) {
        self.frame(Some(message));
    }

    /// A delivered message.
    pub fn incoming(&self, payload: &MessagePayload) {
        self.frame(Some(&format!(
            "Received message: {} (sent {})",
            payload.text, payload.timestamp
        )));
    }

    /// A reportable error.
    pub fn error(&self, message: &str) {
        self.frame(Some(&format!("Error: {message}")));
    }

    /// Final line, without a trailing prompt.
    pub fn farewell(&self, message: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(out, "{CLEAR_LINE}{message}").and_then(|_| out.flush());
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_frame<W: Write>(out: &mut W, line: Option<&str>) -> std::io::Result<()> {
    out.write_all(CLEAR_LINE.as_bytes())?;
    if let Some(line) = line {
        writeln!(out, "{line}")?;
    }
    out.write_all(PROMPT.as_bytes())?;
    out.flush()
}
