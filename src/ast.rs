//! Core value type of the engine. [`Value`] covers both source syntax (symbols,
//! lists, precompiled operations produced by the parser) and runtime data
//! (numbers, strings, booleans, builtin and user-defined functions).
//!
//! `Display` renders the textual form the gateway reports as output and the
//! tracer prints as step code; precompiled operations render back as the list
//! they were parsed from, so traced code reads like the source.

use crate::Error;
use crate::builtinops::{BuiltinOp, OperationFn};
use crate::evaluator::Environment;
use std::fmt;
use std::sync::Arc;

/// Type alias for number values in interpreter
pub(crate) type NumberType = i64;

/// Allowed non-alphanumeric characters in Scheme symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first_char) = chars.next() else {
        return false;
    };
    if first_char.is_ascii_digit() {
        return false;
    }
    if first_char == '-' && chars.next().is_some_and(|c| c.is_ascii_digit()) {
        return false;
    }

    name.chars()
        .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
}

/// Scheme value
///
/// PrecompiledOps never compare equal to the plain list they were parsed from.
/// No expression can *return* a PrecompiledOp (quote keeps its content
/// unprecompiled), so this only matters when comparing parsed syntax.
#[derive(Clone)]
pub enum Value {
    /// Numbers (integers only)
    Number(NumberType),
    /// Symbols (identifiers)
    Symbol(String),
    /// String literals
    String(String),
    /// Boolean values
    Bool(bool),
    /// Lists; the empty list is nil
    List(Vec<Value>),
    /// Builtin operation or special form resolved at parse time
    PrecompiledOp {
        op: &'static BuiltinOp,
        args: Vec<Value>,
    },
    /// Builtin or host-registered function reached through a symbol.
    /// Equality is by id, not by function pointer.
    BuiltinFunction { id: String, func: Arc<OperationFn> },
    /// User-defined function. `name` is set when the lambda is bound with
    /// `define`, and is what the step tracer reports as the caller.
    Function {
        name: Option<String>,
        params: Vec<String>,
        body: Box<Value>,
        env: Environment,
    },
    /// Unspecified values (e.g., return value of define)
    /// These values never equal themselves or any other value
    Unspecified,
}

impl Value {
    /// Convert PrecompiledOp back to List form, recursively
    pub(crate) fn to_uncompiled_form(&self) -> Value {
        match self {
            Value::PrecompiledOp { op, args } => {
                let mut elements = vec![Value::Symbol(op.scheme_id.to_owned())];
                elements.extend(args.iter().map(Value::to_uncompiled_form));
                Value::List(elements)
            }
            Value::List(elements) => {
                Value::List(elements.iter().map(Value::to_uncompiled_form).collect())
            }
            other => other.clone(),
        }
    }

    /// Check if a value represents nil (empty list)
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(list) if list.is_empty())
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Value::Unspecified)
    }

    /// Short type name used in type error messages
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::PrecompiledOp { .. } => "expression",
            Value::BuiltinFunction { .. } | Value::Function { .. } => "procedure",
            Value::Unspecified => "unspecified",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => f.debug_tuple("List").field(list).finish(),
            Value::PrecompiledOp { op, args } => {
                write!(f, "PrecompiledOp({}, args={args:?})", op.scheme_id)
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            Value::Function {
                name, params, body, ..
            } => write!(f, "Function(name={name:?}, params={params:?}, body={body:?})"),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::PrecompiledOp { .. } => write!(f, "{}", self.to_uncompiled_form()),
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin-function:{id}>"),
            Value::Function { name: Some(name), .. } => write!(f, "#<function:{name}>"),
            Value::Function { name: None, .. } => write!(f, "#<lambda>"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (
                Value::PrecompiledOp { op: op1, args: a1 },
                Value::PrecompiledOp { op: op2, args: a2 },
            ) => op1.scheme_id == op2.scheme_id && a1 == a2,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                id1 == id2
            }
            (
                Value::Function {
                    params: p1,
                    body: b1,
                    env: e1,
                    ..
                },
                Value::Function {
                    params: p2,
                    body: b2,
                    env: e2,
                    ..
                },
            ) => p1 == p2 && b1 == b2 && e1 == e2,
            _ => false, // includes Unspecified, which never equals anything
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(NumberType::from(n))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<&Value> for NumberType {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<&Value> for bool {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::TypeError(format!(
                "expected boolean, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Helpers for building expected values in tests
#[cfg(test)]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

#[cfg(test)]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

#[cfg(test)]
pub(crate) fn nil() -> Value {
    Value::List(vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        let cases = vec![
            (val(42), "42"),
            (val(-7), "-7"),
            (val(true), "#t"),
            (val(false), "#f"),
            (val("a\"b\n"), "\"a\\\"b\\n\""),
            (sym("foo?"), "foo?"),
            (nil(), "()"),
            (val(vec![val(1), val("x"), nil()]), "(1 \"x\" ())"),
            (Value::Unspecified, "#<unspecified>"),
        ];

        for (i, (value, expected)) in cases.iter().enumerate() {
            assert_eq!(format!("{value}"), *expected, "Display case #{}", i + 1);
        }
    }

    #[test]
    fn test_symbol_validity() {
        for name in ["x", "foo-bar?", "+", "-", "set!", "$x", "a1"] {
            assert!(is_valid_symbol(name), "{name} should be a valid symbol");
        }
        for name in ["", "1abc", "-1", "a b", "a.b"] {
            assert!(!is_valid_symbol(name), "{name} should be rejected");
        }
    }

    #[test]
    fn test_unspecified_values() {
        let unspec = Value::Unspecified;
        let same = unspec.clone();
        assert_ne!(unspec, same);
        assert_ne!(unspec, Value::Unspecified);
        assert_ne!(unspec, val(42));
    }

    #[test]
    fn test_typed_extraction() {
        assert_eq!(NumberType::try_from(&val(5)), Ok(5));
        assert_eq!(bool::try_from(&val(true)), Ok(true));
        assert!(matches!(
            NumberType::try_from(&val("5")),
            Err(Error::TypeError(msg)) if msg.contains("got string")
        ));
    }
}
