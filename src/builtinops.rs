//! Built-in operations registry.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: Evaluate all arguments before application (e.g., `+`, `not`, `car`)
//! - **Special Forms**: Control evaluation of arguments (e.g., `if`, `and`, `define`)
//!
//! Both kinds are resolved by the parser into [`Value::PrecompiledOp`] when they
//! appear in operator position, so arity is checked once at parse time. Functions
//! are also bound in the root environment frame so they can be passed around as
//! values and called dynamically.
//!
//! ## Error Handling
//!
//! - **Type Safety**: Operations reject incorrect types (e.g., `(not 42)` errors)
//! - **No Coercion**: Numbers don't become strings, no "truthiness" conversions
//! - **Overflow Detection**: Arithmetic operations detect and report overflow
//! - **Arity Checking**: Strict argument count validation for all functions

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::{
    Environment, Evaluator, eval_and, eval_begin, eval_define, eval_if, eval_lambda, eval_or,
    eval_quote,
};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Canonical erased function type for builtins and host primitives.
pub type OperationFn = dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync;

/// Special forms receive unevaluated arguments and drive evaluation themselves.
pub(crate) type SpecialFormFn =
    fn(&[Value], &mut Environment, &mut Evaluator<'_>, usize) -> Result<Value, Error>;

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if got != n => Err(Error::arity_error(n, got)),
            Arity::AtLeast(n) if got < n => Err(Error::arity_error(n, got)),
            _ => Ok(()),
        }
    }
}

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    Function(fn(&[Value]) -> Result<Value, Error>),
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    pub scheme_id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Argument extraction
//

fn numbers(args: &[Value]) -> Result<Vec<NumberType>, Error> {
    args.iter().map(NumberType::try_from).collect()
}

fn list_arg<'a>(value: &'a Value, op: &str) -> Result<&'a [Value], Error> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(Error::TypeError(format!(
            "{op} requires a list, got {}",
            other.type_name()
        ))),
    }
}

//
// Builtin Function Implementations
//

macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let nums = numbers(args)?;
            // SCHEME-STRICT: Require at least 2 arguments
            if nums.len() < 2 {
                return Err(Error::arity_error(2, nums.len()));
            }
            // Chained: every adjacent pair must satisfy the comparison
            Ok(Value::Bool(nums.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum: NumberType = 0;
    for n in numbers(args)? {
        sum = sum
            .checked_add(n)
            .ok_or_else(|| Error::EvalError("Integer overflow in addition".into()))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    match nums.as_slice() {
        [] => Err(Error::arity_error(1, 0)),
        [only] => only
            .checked_neg()
            .map(Value::Number)
            .ok_or_else(|| Error::EvalError("Integer overflow in negation".into())),
        [first, rest @ ..] => {
            let mut result = *first;
            for n in rest {
                result = result
                    .checked_sub(*n)
                    .ok_or_else(|| Error::EvalError("Integer overflow in subtraction".into()))?;
            }
            Ok(Value::Number(result))
        }
    }
}

// SCHEME-STRICT: Require at least 1 argument (Scheme R7RS allows 0 args, returns 1)
fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    let Some((first, rest)) = nums.split_first() else {
        return Err(Error::arity_error(1, 0));
    };
    let mut product = *first;
    for n in rest {
        product = product
            .checked_mul(*n)
            .ok_or_else(|| Error::EvalError("Integer overflow in multiplication".into()))?;
    }
    Ok(Value::Number(product))
}

fn builtin_max(args: &[Value]) -> Result<Value, Error> {
    numbers(args)?
        .into_iter()
        .max()
        .map(Value::Number)
        .ok_or_else(|| Error::arity_error(1, 0))
}

fn builtin_min(args: &[Value]) -> Result<Value, Error> {
    numbers(args)?
        .into_iter()
        .min()
        .map(Value::Number)
        .ok_or_else(|| Error::arity_error(1, 0))
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    let [list] = args else {
        return Err(Error::arity_error(1, args.len()));
    };
    list_arg(list, "car")?
        .first()
        .cloned()
        .ok_or_else(|| Error::EvalError("car of empty list".into()))
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    let [list] = args else {
        return Err(Error::arity_error(1, args.len()));
    };
    match list_arg(list, "cdr")? {
        [] => Err(Error::EvalError("cdr of empty list".into())),
        [_, rest @ ..] => Ok(Value::List(rest.to_vec())),
    }
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match args {
        [first, Value::List(tail)] => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(first.clone());
            new_list.extend_from_slice(tail);
            Ok(Value::List(new_list))
        }
        // SCHEME-STRICT: no improper lists
        [_, _] => Err(Error::TypeError(
            "cons requires a list as second argument".to_owned(),
        )),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args.to_vec()))
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Bool(value.is_nil())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Bool(!bool::try_from(value)?)),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    let [first, second] = args else {
        return Err(Error::arity_error(2, args.len()));
    };
    match (first, second) {
        (Value::Bool(_), Value::Bool(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::Symbol(_), Value::Symbol(_))
        | (Value::List(_), Value::List(_)) => Ok(Value::Bool(first == second)),
        _ => Err(Error::TypeError(
            "equal? requires arguments of the same comparable type (no type coercion)".to_owned(),
        )),
    }
}

fn builtin_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::String(s) => result.push_str(s),
            other => {
                return Err(Error::TypeError(format!(
                    "string-append requires strings, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::String(result))
}

fn builtin_error(args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            _ => format!("{value}"),
        })
        .collect();

    let message = if parts.is_empty() {
        "Error".to_string()
    } else {
        parts.join(" ")
    };

    Err(Error::EvalError(message))
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(
        scheme_id: &'static str,
        f: fn(&[Value]) -> Result<Value, Error>,
        arity: Arity,
    ) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::Function(f),
            arity,
        }
    }

    fn special_form(scheme_id: &'static str, f: SpecialFormFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::SpecialForm(f),
            arity,
        }
    }

    vec![
        // Arithmetic
        function("+", builtin_add, Arity::AtLeast(0)),
        function("-", builtin_sub, Arity::AtLeast(1)),
        function("*", builtin_mul, Arity::AtLeast(1)),
        // Comparison
        function(">", builtin_gt, Arity::AtLeast(2)),
        function(">=", builtin_ge, Arity::AtLeast(2)),
        function("<", builtin_lt, Arity::AtLeast(2)),
        function("<=", builtin_le, Arity::AtLeast(2)),
        function("=", builtin_eq, Arity::AtLeast(2)),
        function("equal?", builtin_equal, Arity::Exact(2)),
        // Logic
        function("not", builtin_not, Arity::Exact(1)),
        special_form("and", eval_and, Arity::AtLeast(1)),
        special_form("or", eval_or, Arity::AtLeast(1)),
        // Control flow; SCHEME-STRICT: if requires an else branch
        special_form("if", eval_if, Arity::Exact(3)),
        special_form("begin", eval_begin, Arity::AtLeast(1)),
        // Language constructs
        special_form("quote", eval_quote, Arity::Exact(1)),
        special_form("define", eval_define, Arity::Exact(2)),
        special_form("lambda", eval_lambda, Arity::Exact(2)),
        // Lists
        function("car", builtin_car, Arity::Exact(1)),
        function("cdr", builtin_cdr, Arity::Exact(1)),
        function("cons", builtin_cons, Arity::Exact(2)),
        function("list", builtin_list, Arity::Any),
        function("null?", builtin_null, Arity::Exact(1)),
        // Strings
        function("string-append", builtin_string_append, Arity::Any),
        // Math
        function("max", builtin_max, Arity::AtLeast(1)),
        function("min", builtin_min, Arity::AtLeast(1)),
        // Errors
        function("error", builtin_error, Arity::Any),
    ]
});

static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its Scheme identifier
pub(crate) fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Get the quote builtin operation - guaranteed to exist
pub(crate) fn get_quote_op() -> &'static BuiltinOp {
    find_scheme_op("quote").expect("quote builtin operation must be available")
}
