//! schemegate - embedded Scheme engine with a script execution gateway
//!
//! This crate embeds a small, strictly typed Scheme interpreter and binds it to a
//! host application through [`ScriptGateway`]. The gateway owns one [`Engine`],
//! evaluates command strings synchronously, and captures two pieces of text per
//! call: the display form of the result and any diagnostic text the engine wrote
//! to its error port while running.
//!
//! ```
//! use schemegate::ScriptGateway;
//!
//! let mut gateway = ScriptGateway::default();
//! let outcome = gateway.evaluate("(+ 1 2)");
//! assert_eq!(outcome.output, "3");
//! assert!(outcome.error.is_empty());
//!
//! // Engine errors never propagate: they are captured as text.
//! let outcome = gateway.evaluate("(undefined-symbol)");
//! assert!(outcome.is_success());
//! assert!(outcome.has_error());
//! ```
//!
//! ## Evaluation steps
//!
//! Every expression the evaluator visits is one *step*. A [`StepHook`] passed
//! into an evaluation sees each step before and after it runs, and can ask the
//! engine to stop through [`StepControl`]. The gateway uses this for console
//! step tracing ([`Tracer`]) and for cooperative interrupts ([`InterruptSource`]),
//! so a runaway script stops at the next step boundary.
//!
//! ## Strict Typing
//!
//! The engine keeps stricter semantics than standard Scheme:
//! - No type coercion (numbers don't become strings, etc.)
//! - Boolean operations require actual boolean values (no "truthiness")
//! - Arithmetic overflow detection and error reporting
//! - Strict arity checking for all functions
//!
//! ## Modules
//!
//! - `scheme`: S-expression parsing from text
//! - `evaluator`: Core expression evaluation engine and environments
//! - `builtinops`: Built-in operations and special forms
//! - `engine`: The engine handle: top-level environment, error port, host primitives
//! - `port`: Diagnostic destinations (console or in-memory capture)
//! - `hooks`: Step hooks and the stop capability
//! - `interrupt`: Interrupt sources polled between steps
//! - `trace`: Console step tracing
//! - `config`: Gateway configuration
//! - `gateway`: The script execution gateway

use std::fmt;

/// Maximum parsing depth to prevent stack overflow attacks
pub const MAX_PARSE_DEPTH: usize = 32;

/// Maximum evaluation depth to prevent stack overflow in recursive evaluation
/// This limits deeply nested function calls and expressions during evaluation
/// Set higher than parse depth to allow for nested function applications
pub const MAX_EVAL_DEPTH: usize = 64;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
}

impl ParseError {
    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // `error_offset` is a byte offset; context is cut in characters
        let error_char = input
            .get(..error_offset)
            .map_or_else(|| input.chars().count(), |prefix| prefix.chars().count());
        let context_start = error_char.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        // Keep the context on one line so it fits a single error-port line
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        ParseError {
            kind,
            message: message.into(),
            context: Some(display_context),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " (near: {context})")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    ParseError(ParseError),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error("ArityError: {}", arity_message(*expected, *got, expression.as_deref()))]
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    /// A step hook asked the evaluator to stop. Not reported as a diagnostic.
    #[error("evaluation interrupted")]
    Interrupted,
}

fn arity_message(expected: usize, got: usize, expression: Option<&str>) -> String {
    match expression {
        Some(expr) => format!("expression {expr}: expected {expected} arguments, got {got}"),
        None => format!("function expected {expected} arguments but got {got}"),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }

    /// Symbol naming the error category, returned by the engine as the value
    /// of a failed evaluation.
    pub fn kind_symbol(&self) -> &'static str {
        match self {
            Error::ParseError(_) => "parse-error",
            Error::EvalError(_) => "eval-error",
            Error::TypeError(_) => "type-error",
            Error::UnboundVariable(_) => "unbound-variable",
            Error::ArityError { .. } => "arity-error",
            Error::Interrupted => "interrupted",
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod gateway;
pub mod hooks;
pub mod interrupt;
pub mod port;
pub mod scheme;
pub mod trace;

pub use ast::Value;
pub use builtinops::Arity;
pub use config::GatewayConfig;
pub use engine::Engine;
pub use gateway::{EvalOutcome, ScriptGateway};
pub use hooks::{StepContext, StepControl, StepHook};
pub use interrupt::{Debounced, InterruptFlag, InterruptSource, NeverInterrupt};
pub use port::Port;
pub use trace::{SharedBuffer, Tracer};
