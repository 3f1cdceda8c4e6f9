use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::Value;
use crate::builtinops::{Arity, OpKind, OperationFn, get_builtin_ops};
use crate::hooks::{StepContext, StepControl, StepHook};
use std::collections::HashMap;
use std::sync::Arc;

/// Environment for variable bindings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
    parent: Option<Box<Environment>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: None,
        }
    }

    pub fn with_parent(parent: Environment) -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: Some(Box::new(parent)),
        }
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get(name)))
    }

    /// Bind a host function under `name`. Arity is checked on every call.
    pub fn define_builtin(
        &mut self,
        name: &str,
        arity: Arity,
        func: impl Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    ) {
        self.bindings
            .insert(name.to_owned(), builtin_function(name, arity, func));
    }

    /// Define in the outermost frame, where the builtins live
    pub fn define_root(&mut self, name: String, value: Value) {
        match &mut self.parent {
            Some(parent) => parent.define_root(name, value),
            None => self.define(name, value),
        }
    }

    /// Bindings of this frame only, sorted by name
    pub fn frame_bindings(&self) -> Vec<(&str, &Value)> {
        let mut result: Vec<_> = self
            .bindings
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect();
        result.sort_by(|a, b| a.0.cmp(b.0));
        result
    }

    /// This frame's bindings as a Scheme list of `(name value)` pairs
    pub fn frame_to_list(&self) -> Value {
        Value::List(
            self.frame_bindings()
                .into_iter()
                .map(|(name, value)| Value::List(vec![Value::Symbol(name.to_owned()), value.clone()]))
                .collect(),
        )
    }
}

/// One evaluation run over an environment.
///
/// The optional [`StepHook`] is attached for the lifetime of the evaluator and
/// sees every step. A stop requested through [`StepControl`] unwinds the run
/// with [`Error::Interrupted`]; the result of the latest completed step stays
/// available through [`Evaluator::take_last_value`].
pub struct Evaluator<'h> {
    hook: Option<&'h mut dyn StepHook>,
    /// Names of the user functions currently being applied, innermost last
    frames: Vec<Option<String>>,
    last_value: Option<Value>,
}

impl Default for Evaluator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'h> Evaluator<'h> {
    pub fn new() -> Self {
        Evaluator {
            hook: None,
            frames: Vec::new(),
            last_value: None,
        }
    }

    pub fn with_hook(hook: &'h mut dyn StepHook) -> Self {
        Evaluator {
            hook: Some(hook),
            frames: Vec::new(),
            last_value: None,
        }
    }

    /// Evaluate a top-level expression
    pub fn eval(&mut self, expr: &Value, env: &mut Environment) -> Result<Value, Error> {
        self.step(expr, env, 0)
    }

    /// Result of the most recent completed step, if hooks were attached
    pub fn take_last_value(&mut self) -> Option<Value> {
        self.last_value.take()
    }

    /// One evaluation step: hooks around the evaluation of `expr` at `depth`
    pub(crate) fn step(
        &mut self,
        expr: &Value,
        env: &mut Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        if depth >= MAX_EVAL_DEPTH {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
            )));
        }

        let mut control = StepControl::default();
        if let Some(hook) = self.hook.as_deref_mut() {
            let caller = self.frames.last().and_then(|name| name.as_deref());
            hook.before_step(&StepContext::new(depth, caller, expr, env), &mut control);
            if control.stop_requested() {
                return Err(Error::Interrupted);
            }
        }

        let value = self.eval_expr(expr, env, depth)?;

        if let Some(hook) = self.hook.as_deref_mut() {
            self.last_value = Some(value.clone());
            let caller = self.frames.last().and_then(|name| name.as_deref());
            hook.after_step(
                &StepContext::new(depth, caller, expr, env),
                &value,
                &mut control,
            );
            if control.stop_requested() {
                return Err(Error::Interrupted);
            }
        }

        Ok(value)
    }

    fn eval_expr(
        &mut self,
        expr: &Value,
        env: &mut Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        match expr {
            // Self-evaluating forms (empty lists are NOT self-evaluating for strict semantics)
            Value::Number(_)
            | Value::String(_)
            | Value::Bool(_)
            | Value::BuiltinFunction { .. }
            | Value::Function { .. }
            | Value::Unspecified => Ok(expr.clone()),

            Value::Symbol(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnboundVariable(name.clone())),

            // Arity was validated at parse time
            Value::PrecompiledOp { op, args } => match op.op_kind {
                OpKind::Function(f) => {
                    let evaluated_args = self.eval_args(args, env, depth)?;
                    f(&evaluated_args).map_err(|err| add_context(err, expr))
                }
                OpKind::SpecialForm(special_form) => special_form(args, env, self, depth),
            },

            Value::List(elements) => self
                .eval_list(elements, env, depth)
                .map_err(|err| add_context(err, expr)),
        }
    }

    fn eval_args(
        &mut self,
        args: &[Value],
        env: &mut Environment,
        depth: usize,
    ) -> Result<Vec<Value>, Error> {
        args.iter()
            .map(|arg| self.step(arg, env, depth + 1))
            .collect()
    }

    /// Dynamic function application. Builtins in operator position were already
    /// turned into PrecompiledOps by the parser, so only calls through values
    /// (symbols bound to functions, lambda expressions) land here.
    fn eval_list(
        &mut self,
        elements: &[Value],
        env: &mut Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        let [func_expr, arg_exprs @ ..] = elements else {
            return Err(Error::EvalError("Cannot evaluate empty list".to_owned()));
        };

        let func = self.step(func_expr, env, depth + 1)?;
        let args = self.eval_args(arg_exprs, env, depth)?;

        match &func {
            Value::BuiltinFunction { func, .. } => func(&args),
            Value::Function {
                name,
                params,
                body,
                env: closure_env,
            } => {
                if params.len() != args.len() {
                    return Err(Error::arity_error(params.len(), args.len()));
                }

                let mut call_env = Environment::with_parent(closure_env.clone());
                for (param, arg) in params.iter().zip(args) {
                    call_env.define(param.clone(), arg);
                }

                self.frames.push(name.clone());
                // One level below the arguments, so traces nest the body
                // under the call
                let result = self.step(body, &mut call_env, depth + 2);
                self.frames.pop();

                result.map_err(|err| match err {
                    Error::EvalError(msg) => Error::EvalError(format!("{msg}\n  In lambda: {body}")),
                    Error::TypeError(msg) => Error::TypeError(format!("{msg}\n  In lambda: {body}")),
                    other => other,
                })
            }
            _ => Err(Error::TypeError(format!(
                "Cannot apply non-function: {func}"
            ))),
        }
    }
}

/// Wrap a host function as a callable value that validates its arity
pub fn builtin_function(
    name: &str,
    arity: Arity,
    func: impl Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
) -> Value {
    let wrapped: Arc<OperationFn> = Arc::new(move |args: &[Value]| {
        arity.validate(args.len())?;
        func(args)
    });
    Value::BuiltinFunction {
        id: name.to_owned(),
        func: wrapped,
    }
}

/// Evaluate an expression without hooks
pub fn eval(expr: &Value, env: &mut Environment) -> Result<Value, Error> {
    Evaluator::new().eval(expr, env)
}

/// Add expression context to value-level errors
fn add_context(error: Error, expr: &Value) -> Error {
    let context = format!("while evaluating: {expr}");
    match error {
        Error::EvalError(msg) if !msg.contains("Context:") => {
            Error::EvalError(format!("{msg}\n  Context: {context}"))
        }
        Error::TypeError(msg) if !msg.contains("Context:") => {
            Error::TypeError(format!("{msg}\n  Context: {context}"))
        }
        other => other,
    }
}

pub(crate) fn eval_quote(
    args: &[Value],
    _env: &mut Environment,
    _evaluator: &mut Evaluator<'_>,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()), // quoted content is parsed unprecompiled
        _ => Err(Error::arity_error(1, args.len())),
    }
}

pub(crate) fn eval_define(
    args: &[Value],
    env: &mut Environment,
    evaluator: &mut Evaluator<'_>,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = match evaluator.step(expr, env, depth + 1)? {
                Value::Function {
                    name: None,
                    params,
                    body,
                    env: closure_env,
                } => Value::Function {
                    name: Some(name.clone()),
                    params,
                    body,
                    env: closure_env,
                },
                other => other,
            };
            env.define(name.clone(), value);
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("define requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

pub(crate) fn eval_if(
    args: &[Value],
    env: &mut Environment,
    evaluator: &mut Evaluator<'_>,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            match evaluator.step(condition_expr, env, depth + 1)? {
                Value::Bool(true) => evaluator.step(then_expr, env, depth + 1),
                Value::Bool(false) => evaluator.step(else_expr, env, depth + 1),
                _ => Err(Error::TypeError(
                    "SCHEME-STRICT: if condition must be a boolean".to_owned(),
                )),
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

pub(crate) fn eval_begin(
    args: &[Value],
    env: &mut Environment,
    evaluator: &mut Evaluator<'_>,
    depth: usize,
) -> Result<Value, Error> {
    let mut result = Value::Unspecified;
    for expr in args {
        result = evaluator.step(expr, env, depth + 1)?;
    }
    Ok(result)
}

pub(crate) fn eval_lambda(
    args: &[Value],
    env: &mut Environment,
    _evaluator: &mut Evaluator<'_>,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::List(param_list), body] => {
            let mut params = Vec::with_capacity(param_list.len());
            for param in param_list {
                match param {
                    Value::Symbol(name) if params.contains(name) => {
                        return Err(Error::EvalError(format!(
                            "Duplicate parameter name: {name}"
                        )));
                    }
                    Value::Symbol(name) => params.push(name.clone()),
                    _ => {
                        return Err(Error::TypeError(
                            "Lambda parameters must be symbols".to_owned(),
                        ));
                    }
                }
            }

            // SCHEME-STRICT: fixed-arity lambdas only, no rest parameters
            Ok(Value::Function {
                name: None,
                params,
                body: Box::new(body.clone()),
                env: env.clone(),
            })
        }
        [_, _] => Err(Error::TypeError(
            "Lambda parameters must be a list".to_owned(),
        )),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Check if a value is obviously non-boolean (before evaluation)
fn is_obviously_non_boolean(value: &Value) -> bool {
    matches!(
        value,
        Value::Number(_) | Value::String(_) | Value::Unspecified
    )
}

macro_rules! boolean_logic_op {
    ($name:ident, $op_name:expr, $short_circuit:literal, $default:literal) => {
        pub(crate) fn $name(
            args: &[Value],
            env: &mut Environment,
            evaluator: &mut Evaluator<'_>,
            depth: usize,
        ) -> Result<Value, Error> {
            const TYPE_ERROR: &str = concat!(
                "SCHEME-STRICT: '",
                $op_name,
                "' requires boolean arguments (no truthiness)"
            );

            if args.is_empty() {
                return Err(Error::arity_error(1, 0));
            }

            // Reject literal non-booleans up front so short-circuiting can't hide them
            if args.iter().any(is_obviously_non_boolean) {
                return Err(Error::TypeError(TYPE_ERROR.to_owned()));
            }

            for arg in args {
                match evaluator.step(arg, env, depth + 1)? {
                    Value::Bool($short_circuit) => return Ok(Value::Bool($short_circuit)),
                    Value::Bool(_) => continue,
                    _ => return Err(Error::TypeError(TYPE_ERROR.to_owned())),
                }
            }

            Ok(Value::Bool($default))
        }
    };
}

boolean_logic_op!(eval_and, "and", false, true);
boolean_logic_op!(eval_or, "or", true, false);

/// Create the root environment frame holding every builtin function
pub fn create_global_env() -> Environment {
    let mut env = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(f) = builtin_op.op_kind {
            env.define_builtin(builtin_op.scheme_id, builtin_op.arity, f);
        }
    }

    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use crate::scheme::parse_scheme;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        AnyError,                    // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult(Value::Unspecified))
        };
    }

    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut env = Environment::with_parent(create_global_env());
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut env, &test_id);
            }
        }
    }

    fn execute_test_case(input: &str, expected: &TestResult, env: &mut Environment, test_id: &str) {
        let expr = match parse_scheme(input) {
            Ok(expr) => expr,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err:?}");
            }
        };

        match (eval(&expr, env), expected) {
            (Ok(actual), EvalResult(expected_val)) => match (&actual, expected_val) {
                (Value::Unspecified, Value::Unspecified) => {}
                _ => assert!(
                    actual == *expected_val,
                    "{test_id}: expected {expected_val:?}, got {actual:?}"
                ),
            },
            (Err(_), AnyError) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), AnyError) => panic!("{test_id}: expected error, got {actual:?}"),
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: expected error containing '{expected_text}', got {actual:?}")
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: expected {expected_val:?}, got error {err:?}")
            }
        }
    }

    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut env = Environment::with_parent(create_global_env());
            execute_test_case(input, expected, &mut env, &format!("#{}", i + 1));
        }
    }

    #[test]
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // Self-evaluating forms
            ("42", success(42)),
            ("-271", success(-271)),
            ("#t", success(true)),
            ("\"hello\"", success("hello")),
            // Empty list is not self-evaluating
            ("()", SpecificError("empty list")),
            // Arithmetic and nesting
            ("(+ 1 2)", success(3)),
            ("(* (+ 1 2) (- 10 4))", success(18)),
            ("(max 1 (min 5 9) 3)", success(5)),
            // Conditionals are strict about booleans
            ("(if (> 3 2) \"yes\" \"no\")", success("yes")),
            ("(if 1 2 3)", SpecificError("must be a boolean")),
            ("(and #t (< 1 2))", success(true)),
            ("(or #f (= 1 2))", success(false)),
            ("(and #t 1)", SpecificError("no truthiness")),
            ("(or #t (car (list)))", success(true)), // short-circuits
            // Quote and lists
            ("'(1 2 3)", success([1, 2, 3])),
            ("(quote foo)", EvalResult(sym("foo"))),
            ("(car '(a b))", EvalResult(sym("a"))),
            ("(cdr (list 1 2 3))", success([2, 3])),
            ("(null? '())", success(true)),
            ("(list)", EvalResult(nil())),
            // Lambdas
            ("((lambda (x y) (+ x y)) 3 4)", success(7)),
            ("((lambda (x) x))", SpecificError("ArityError")),
            ("((lambda (x x) x) 1 1)", SpecificError("Duplicate parameter")),
            ("((lambda (1) 1) 1)", SpecificError("must be symbols")),
            // begin returns its last value
            ("(begin 1 2 (+ 1 2))", success(3)),
            // Errors
            ("undefined-var", SpecificError("Unbound variable: undefined-var")),
            ("(undefined-fn 1)", SpecificError("Unbound variable: undefined-fn")),
            ("(1 2)", SpecificError("Cannot apply non-function")),
            ("(error \"custom\" 7)", SpecificError("custom 7")),
            ("(+ 1 \"a\")", AnyError),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_environment_state() {
        let environment_test_cases = vec![
            TestEnvironment(vec![
                test_setup!("(define x 10)"),
                ("x", success(10)),
                test_setup!("(define add-x (lambda (n) (+ n x)))"),
                ("(add-x 5)", success(15)),
            ]),
            TestEnvironment(vec![
                // Closures capture the environment at creation time
                test_setup!("(define make-adder (lambda (n) (lambda (m) (+ n m))))"),
                test_setup!("(define add2 (make-adder 2))"),
                ("(add2 40)", success(42)),
                // Builtins are first-class values
                test_setup!("(define plus +)"),
                ("(plus 1 2 3)", success(6)),
                ("(plus 1 #t)", AnyError),
            ]),
            TestEnvironment(vec![
                // Self-application works around the lack of letrec
                test_setup!(
                    "(define fact (lambda (self n) (if (= n 0) 1 (* n (self self (- n 1))))))"
                ),
                ("(fact fact 5)", success(120)),
            ]),
        ];

        run_tests_in_environment(environment_test_cases);
    }

    #[test]
    fn test_define_names_functions() {
        let mut env = Environment::with_parent(create_global_env());
        eval(&parse_scheme("(define square (lambda (x) (* x x)))").unwrap(), &mut env).unwrap();
        let value = eval(&parse_scheme("square").unwrap(), &mut env).unwrap();
        assert!(matches!(value, Value::Function { name: Some(ref n), .. } if n == "square"));
        assert_eq!(format!("{value}"), "#<function:square>");

        let anon = eval(&parse_scheme("(lambda (x) x)").unwrap(), &mut env).unwrap();
        assert_eq!(format!("{anon}"), "#<lambda>");
    }

    #[test]
    fn test_dynamic_builtin_arity_checked() {
        let mut env = Environment::with_parent(create_global_env());
        let err = eval(&parse_scheme("((lambda (f) (f 1)) not)").unwrap(), &mut env);
        assert!(err.is_err());
        let err = eval(&parse_scheme("((lambda (f) (f)) car)").unwrap(), &mut env).unwrap_err();
        assert!(matches!(err, crate::Error::ArityError { .. }));
    }

    #[test]
    fn test_define_builtin_host_function() {
        let mut env = Environment::with_parent(create_global_env());
        env.define_builtin("forty-two", Arity::Exact(0), |_args| Ok(Value::Number(42)));

        let result = eval(&parse_scheme("(forty-two)").unwrap(), &mut env).unwrap();
        assert_eq!(result, val(42));

        let err = eval(&parse_scheme("(forty-two 1)").unwrap(), &mut env).unwrap_err();
        assert!(matches!(err, crate::Error::ArityError { expected: 0, got: 1, .. }));
    }

    #[test]
    fn test_define_root_skips_local_frames() {
        let mut env = Environment::with_parent(create_global_env());
        env.define_root("answer".into(), val(42));

        assert!(env.frame_bindings().is_empty());
        assert_eq!(env.get("answer"), Some(&val(42)));
    }

    #[test]
    fn test_frame_bindings_are_local_and_sorted() {
        let mut env = Environment::with_parent(create_global_env());
        eval(&parse_scheme("(define b 2)").unwrap(), &mut env).unwrap();
        eval(&parse_scheme("(define a 1)").unwrap(), &mut env).unwrap();

        let names: Vec<&str> = env.frame_bindings().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(format!("{}", env.frame_to_list()), "((a 1) (b 2))");
    }

    #[test]
    fn test_evaluation_depth_limit() {
        let depth_test_environments = vec![TestEnvironment(vec![
            test_setup!(
                "(define make-deep (lambda (self depth) (if (= depth 0) 42 (+ 1 (self self (- depth 1))))))"
            ),
            ("(make-deep make-deep 10)", success(52)),
            ("(make-deep make-deep 1000)", SpecificError("depth")),
        ])];

        run_tests_in_environment(depth_test_environments);
    }

    /// Records every step, optionally stopping after a fixed number of them
    #[derive(Default)]
    struct RecordingHook {
        before: Vec<(usize, Option<String>, String)>,
        after: Vec<(usize, String)>,
        stop_after: Option<usize>,
    }

    impl StepHook for RecordingHook {
        fn before_step(&mut self, step: &StepContext<'_>, control: &mut StepControl) {
            self.before.push((
                step.depth(),
                step.caller().map(str::to_owned),
                format!("{}", step.code()),
            ));
            if self.stop_after.is_some_and(|n| self.before.len() > n) {
                control.request_stop();
            }
        }

        fn after_step(&mut self, step: &StepContext<'_>, result: &Value, _control: &mut StepControl) {
            self.after.push((step.depth(), format!("{result}")));
        }
    }

    #[test]
    fn test_hook_sees_every_step() {
        let mut env = Environment::with_parent(create_global_env());
        let mut hook = RecordingHook::default();
        let expr = parse_scheme("(+ 1 (* 2 3))").unwrap();

        let result = Evaluator::with_hook(&mut hook).eval(&expr, &mut env).unwrap();
        assert_eq!(result, val(7));

        let codes: Vec<&str> = hook.before.iter().map(|(_, _, c)| c.as_str()).collect();
        assert_eq!(codes, vec!["(+ 1 (* 2 3))", "1", "(* 2 3)", "2", "3"]);
        let depths: Vec<usize> = hook.before.iter().map(|(d, _, _)| *d).collect();
        assert_eq!(depths, vec![0, 1, 1, 2, 2]);

        // after-step runs innermost first, ending with the top-level result
        assert_eq!(hook.after.last(), Some(&(0, "7".to_owned())));
        assert_eq!(hook.after.len(), hook.before.len());
    }

    #[test]
    fn test_hook_reports_caller_name() {
        let mut env = Environment::with_parent(create_global_env());
        eval(&parse_scheme("(define double (lambda (x) (* 2 x)))").unwrap(), &mut env).unwrap();

        let mut hook = RecordingHook::default();
        let expr = parse_scheme("(double 4)").unwrap();
        Evaluator::with_hook(&mut hook).eval(&expr, &mut env).unwrap();

        let body_step = hook
            .before
            .iter()
            .find(|(_, _, code)| code == "(* 2 x)")
            .unwrap();
        assert_eq!(body_step.1.as_deref(), Some("double"));
        // Top-level steps have no caller
        assert_eq!(hook.before[0].1, None);
    }

    #[test]
    fn test_lambda_body_nests_below_arguments() {
        let mut env = Environment::with_parent(create_global_env());
        eval(&parse_scheme("(define double (lambda (x) (* 2 x)))").unwrap(), &mut env).unwrap();

        let mut hook = RecordingHook::default();
        let expr = parse_scheme("(double (+ 1 3))").unwrap();
        Evaluator::with_hook(&mut hook).eval(&expr, &mut env).unwrap();

        let depth_of = |wanted: &str| {
            hook.before
                .iter()
                .find(|(_, _, code)| code == wanted)
                .map(|(depth, _, _)| *depth)
                .unwrap()
        };
        assert_eq!(depth_of("(double (+ 1 3))"), 0);
        assert_eq!(depth_of("double"), 1);
        assert_eq!(depth_of("(+ 1 3)"), 1);
        assert_eq!(depth_of("(* 2 x)"), 2);
        assert_eq!(depth_of("x"), 3);
    }

    #[test]
    fn test_stop_request_unwinds_with_partial_value() {
        let mut env = Environment::with_parent(create_global_env());
        let mut hook = RecordingHook {
            stop_after: Some(3),
            ..RecordingHook::default()
        };
        let expr = parse_scheme("(+ 1 2 3 4 5 6)").unwrap();

        let mut evaluator = Evaluator::with_hook(&mut hook);
        let err = evaluator.eval(&expr, &mut env).unwrap_err();
        assert_eq!(err, crate::Error::Interrupted);
        // Steps 2 and 3 evaluated `1` and `2` before the stop
        assert_eq!(evaluator.take_last_value(), Some(val(2)));
        drop(evaluator);
        assert_eq!(hook.before.len(), 4);
    }
}
