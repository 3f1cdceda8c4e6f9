//! Console step tracing.
//!
//! Trace lines are indented by `"-- "` once per nesting level. Before a step:
//!
//! ```text
//! -- -- [square] ((x 4)) : (* x x)
//! ```
//!
//! and after it, the step's result:
//!
//! ```text
//! -- -- 16
//! ```

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::ast::Value;
use crate::hooks::StepContext;

const INDENT: &str = "-- ";

/// Writes step trace lines when verbosity is above zero
pub struct Tracer {
    verbosity: u8,
    writer: Box<dyn Write + Send>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Tracer {
    /// Tracer writing to stdout
    pub fn new(verbosity: u8) -> Self {
        Self::with_writer(verbosity, io::stdout())
    }

    pub fn with_writer(verbosity: u8, writer: impl Write + Send + 'static) -> Self {
        Tracer {
            verbosity,
            writer: Box::new(writer),
        }
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn set_verbosity(&mut self, verbosity: u8) {
        self.verbosity = verbosity;
    }

    pub fn is_enabled(&self) -> bool {
        self.verbosity > 0
    }

    /// `[caller] env : code` line for a step about to run
    pub fn step_begin(&mut self, step: &StepContext<'_>) {
        if !self.is_enabled() {
            return;
        }
        let line = format!(
            "{}[{}] {} : {}",
            INDENT.repeat(step.depth()),
            step.caller().unwrap_or_default(),
            step.environment_list(),
            step.code()
        );
        self.write_line(&line);
    }

    /// Result line for a completed step
    pub fn step_end(&mut self, step: &StepContext<'_>, result: &Value) {
        if !self.is_enabled() {
            return;
        }
        let line = format!("{}{result}", INDENT.repeat(step.depth()));
        self.write_line(&line);
    }

    fn write_line(&mut self, line: &str) {
        if let Err(err) = writeln!(self.writer, "{line}") {
            warn!(error = %err, "failed to write trace line");
        }
    }
}

/// Cloneable in-memory writer; all clones share one buffer
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::evaluator::Environment;

    #[test]
    fn test_trace_line_format() {
        let buffer = SharedBuffer::new();
        let mut tracer = Tracer::with_writer(1, buffer.clone());

        let mut env = Environment::new();
        env.define("x".into(), val(4));
        let code = val([1, 2]);

        tracer.step_begin(&StepContext::new(2, Some("square"), &code, &env));
        tracer.step_end(&StepContext::new(2, Some("square"), &code, &env), &val(16));
        tracer.step_begin(&StepContext::new(0, None, &code, &Environment::new()));

        assert_eq!(
            buffer.contents(),
            "-- -- [square] ((x 4)) : (1 2)\n-- -- 16\n[] () : (1 2)\n"
        );
    }

    #[test]
    fn test_disabled_tracer_writes_nothing() {
        let buffer = SharedBuffer::new();
        let mut tracer = Tracer::with_writer(0, buffer.clone());
        let env = Environment::new();
        let code = val(1);

        tracer.step_begin(&StepContext::new(0, None, &code, &env));
        tracer.step_end(&StepContext::new(0, None, &code, &env), &code);
        assert!(!tracer.is_enabled());
        assert_eq!(buffer.contents(), "");

        tracer.set_verbosity(2);
        tracer.step_end(&StepContext::new(1, None, &code, &env), &code);
        assert_eq!(buffer.contents(), "-- 1\n");
        buffer.clear();
        assert_eq!(buffer.contents(), "");
    }
}
