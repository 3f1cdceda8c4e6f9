//! The engine handle.
//!
//! An [`Engine`] owns one top-level environment, the port its diagnostics go
//! to, and the documentation of host primitives registered on it. Engines are
//! plain values: create as many as needed, drop them when done.
//!
//! Evaluation through the engine never fails from the caller's point of view.
//! A parse or evaluation error is written to the error port as one line
//! starting with `;`, and the returned value is a symbol naming the kind of
//! error (`unbound-variable`, `type-error`, ...).

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::builtinops::Arity;
use crate::evaluator::{Environment, Evaluator, builtin_function, create_global_env};
use crate::hooks::StepHook;
use crate::port::Port;
use crate::scheme::program_forms;

pub struct Engine {
    env: Environment,
    error_port: Port,
    docs: HashMap<String, String>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("error_port", &self.error_port)
            .field("host_functions", &self.docs.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Builtins in the root frame, an empty top-level frame above them
    pub fn new() -> Self {
        Engine {
            env: Environment::with_parent(create_global_env()),
            error_port: Port::Console,
            docs: HashMap::new(),
        }
    }

    /// Register a named host primitive next to the builtins
    pub fn define_function(
        &mut self,
        name: &str,
        arity: Arity,
        doc: &str,
        func: impl Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    ) {
        debug!(name, ?arity, "defining host function");
        self.env
            .define_root(name.to_owned(), builtin_function(name, arity, func));
        self.docs.insert(name.to_owned(), doc.to_owned());
    }

    /// Documentation string of a host primitive
    pub fn documentation(&self, name: &str) -> Option<&str> {
        self.docs.get(name).map(String::as_str)
    }

    /// Evaluate every form in `source`; returns the value of the last one
    pub fn eval_string(&mut self, source: &str) -> Value {
        self.run(source, Evaluator::new())
    }

    /// Like [`Engine::eval_string`], with `hook` attached for this call only.
    ///
    /// If the hook requests a stop, the result of the most recent completed
    /// step is returned (unspecified if none completed) and nothing is written
    /// to the error port.
    pub fn eval_string_with_hook(&mut self, source: &str, hook: &mut dyn StepHook) -> Value {
        self.run(source, Evaluator::with_hook(hook))
    }

    fn run(&mut self, source: &str, mut evaluator: Evaluator<'_>) -> Value {
        let mut result = Value::Unspecified;
        for form in program_forms(source) {
            let form = match form {
                Ok(form) => form,
                Err(err) => return self.report(&err),
            };
            match evaluator.eval(&form, &mut self.env) {
                Ok(value) => result = value,
                Err(Error::Interrupted) => {
                    debug!("evaluation stopped by step hook");
                    return evaluator.take_last_value().unwrap_or(Value::Unspecified);
                }
                Err(err) => return self.report(&err),
            }
        }
        result
    }

    /// Write `;<message>` to the error port and name the error kind
    fn report(&mut self, err: &Error) -> Value {
        let message = err.to_string();
        let message = message
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" ");
        debug!(kind = err.kind_symbol(), "engine error");
        self.error_port.write_line(&format!(";{message}"));
        Value::Symbol(err.kind_symbol().to_owned())
    }

    pub fn error_port(&self) -> &Port {
        &self.error_port
    }

    /// Install a new error port, returning the previous one
    pub fn set_error_port(&mut self, port: Port) -> Port {
        std::mem::replace(&mut self.error_port, port)
    }

    /// Redirect diagnostics to a fresh capture port until the guard is
    /// finished or dropped; the previous port is restored either way.
    pub fn capture_errors(&mut self) -> ErrorCapture<'_> {
        let saved = self.set_error_port(Port::capture());
        ErrorCapture {
            engine: self,
            saved: Some(saved),
        }
    }

    /// User definitions of the top-level frame, sorted by name
    pub fn bindings(&self) -> Vec<(&str, &Value)> {
        self.env.frame_bindings()
    }

    /// Resolve `name` through the top-level frame and the builtins
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }
}

/// Error-port redirect held for the duration of one evaluation.
///
/// Owns the previous port while it is away from the engine, so nothing the
/// caller installed can be lost, even if evaluation unwinds.
pub struct ErrorCapture<'e> {
    engine: &'e mut Engine,
    saved: Option<Port>,
}

impl ErrorCapture<'_> {
    /// Drain the captured text and put the previous port back
    pub fn finish(mut self) -> String {
        let captured = self.engine.error_port.take_captured();
        self.restore();
        captured
    }

    fn restore(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.engine.error_port = saved;
        }
    }
}

impl Deref for ErrorCapture<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        self.engine
    }
}

impl DerefMut for ErrorCapture<'_> {
    fn deref_mut(&mut self) -> &mut Engine {
        self.engine
    }
}

impl Drop for ErrorCapture<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
