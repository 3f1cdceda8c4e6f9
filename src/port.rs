//! Diagnostic ports: where the engine writes its error text.

use std::mem;

/// Destination for engine diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Port {
    /// Standard error of the process
    #[default]
    Console,
    /// In-memory string port; text accumulates until taken
    Capture(String),
}

impl Port {
    /// A fresh, empty capture port
    pub fn capture() -> Self {
        Port::Capture(String::new())
    }

    pub fn is_capture(&self) -> bool {
        matches!(self, Port::Capture(_))
    }

    /// Write one line of diagnostic text
    pub fn write_line(&mut self, line: &str) {
        match self {
            Port::Console => eprintln!("{line}"),
            Port::Capture(buffer) => {
                buffer.push_str(line);
                buffer.push('\n');
            }
        }
    }

    /// Text captured so far; the console port captures nothing
    pub fn captured(&self) -> &str {
        match self {
            Port::Console => "",
            Port::Capture(buffer) => buffer,
        }
    }

    /// Drain the captured text, leaving the port empty
    pub fn take_captured(&mut self) -> String {
        match self {
            Port::Console => String::new(),
            Port::Capture(buffer) => mem::take(buffer),
        }
    }
}
