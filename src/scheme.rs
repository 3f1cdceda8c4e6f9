use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{opt, recognize, value},
    error::ErrorKind,
    multi::separated_list0,
    sequence::{pair, preceded, terminated},
};
use std::borrow::Cow;

use crate::ast::{NumberType, SYMBOL_SPECIAL_CHARS, Value, is_valid_symbol};
use crate::builtinops::{find_scheme_op, get_quote_op};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Parser options
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParseConfig {
    /// Strip `;` line comments (outside string literals) before parsing
    pub handle_comments: bool,
}

/// Control whether builtin operations should be precompiled during parsing
#[derive(Debug, Clone, Copy, PartialEq)]
enum ShouldPrecompileOps {
    Yes,
    No,
}

fn create_quote_precompiled_op(content: Value) -> Value {
    Value::PrecompiledOp {
        op: get_quote_op(),
        args: vec![content],
    }
}

/// Convert nom parsing errors to structured parse errors
fn nom_error_to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    let parse_error = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                _ if e.input.trim().is_empty() || is_unterminated(input) => (
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input".to_owned(),
                ),
                ErrorKind::Char => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Expected character at position {position}"),
                ),
                _ => {
                    let remaining_chars: String = e.input.chars().take(10).collect();
                    (
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{remaining_chars}'"),
                    )
                }
            };
            ParseError::with_context(kind, message, input, position)
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    };
    Error::ParseError(parse_error)
}

/// True when input ends inside a string literal, an open list, or after a
/// bare quote mark
fn is_unterminated(input: &str) -> bool {
    let mut open_lists = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for ch in input.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '(' if !in_string => open_lists += 1,
            ')' if !in_string => open_lists = open_lists.saturating_sub(1),
            _ => {}
        }
    }

    in_string || open_lists > 0 || input.trim_end().ends_with('\'')
}

/// Parse a number (integer only, supports decimal and hexadecimal)
fn parse_number(input: &str) -> IResult<&str, Value> {
    alt((parse_hexadecimal, parse_decimal)).parse(input)
}

fn parse_decimal(input: &str) -> IResult<&str, Value> {
    let (rest, number_str) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    // Overflowing literals are rejected here; symbol parsing rejects them too
    // since they start with digits.
    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((rest, Value::Number(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Parse a hexadecimal number (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> IResult<&str, Value> {
    let (rest, _) = char('#').parse(input)?;
    let (rest, _) = alt((char('x'), char('X'))).parse(rest)?;
    let (rest, hex_digits) = take_while1(|c: char| c.is_ascii_hexdigit()).parse(rest)?;

    match NumberType::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((rest, Value::Number(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::HexDigit,
        ))),
    }
}

fn parse_bool(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Bool(true), tag("#t")),
        value(Value::Bool(false), tag("#f")),
    ))
    .parse(input)
}

fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (remaining, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
            .parse(input)?;

    if is_valid_symbol(candidate) {
        Ok((remaining, Value::Symbol(candidate.into())))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        )))
    }
}

/// Parse a string literal with `\n \t \r \\ \"` escapes
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(text))),
            Some('\\') => {
                let escaped = match char_iter.next() {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    // Unknown escape, or backslash at end of input
                    _ => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            ErrorKind::Char,
                        )));
                    }
                };
                text.push(escaped);
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                // Unterminated string
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

fn parse_list(
    input: &str,
    should_precompile: ShouldPrecompileOps,
    depth: usize,
) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = multispace0.parse(input)?;

    // `(quote x)`: parse the quoted datum unprecompiled. Requiring whitespace
    // after the keyword keeps symbols like `quoted-name` out of this branch.
    let (input, is_quote) = opt(terminated(tag("quote"), multispace1)).parse(input)?;
    if is_quote.is_some() {
        let (input, content) = parse_sexpr(input, ShouldPrecompileOps::No, depth + 1)?;
        let (input, _) = multispace0.parse(input)?;
        let (input, _) = char(')').parse(input)?;

        let quoted = match should_precompile {
            ShouldPrecompileOps::Yes => create_quote_precompiled_op(content),
            ShouldPrecompileOps::No => Value::List(vec![Value::Symbol("quote".into()), content]),
        };
        return Ok((input, quoted));
    }

    let (input, elements) = separated_list0(multispace1, |input| {
        parse_sexpr(input, should_precompile, depth + 1)
    })
    .parse(input)?;

    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(')').parse(input)?;

    if should_precompile == ShouldPrecompileOps::Yes
        && let [Value::Symbol(op_name), args @ ..] = elements.as_slice()
        && let Some(builtin_op) = find_scheme_op(op_name.as_str())
    {
        return Ok((
            input,
            Value::PrecompiledOp {
                op: builtin_op,
                args: args.to_vec(),
            },
        ));
    }

    Ok((input, Value::List(elements)))
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(
    input: &str,
    should_precompile: ShouldPrecompileOps,
    depth: usize,
) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_sexpr(input, ShouldPrecompileOps::No, depth + 1)?;

    let quoted = match should_precompile {
        ShouldPrecompileOps::Yes => create_quote_precompiled_op(expr),
        ShouldPrecompileOps::No => Value::List(vec![Value::Symbol("quote".into()), expr]),
    };
    Ok((input, quoted))
}

fn parse_sexpr(
    input: &str,
    should_precompile: ShouldPrecompileOps,
    depth: usize,
) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    preceded(
        multispace0,
        alt((
            |input| parse_quote(input, should_precompile, depth),
            |input| parse_list(input, should_precompile, depth),
            parse_number,
            parse_bool,
            parse_string,
            parse_symbol,
        )),
    )
    .parse(input)
}

/// Remove `;` line comments, leaving string literals untouched
fn strip_comments(input: &str) -> Cow<'_, str> {
    if !input.contains(';') {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;

    for ch in input.chars() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
                result.push(ch);
            }
            continue;
        }
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ';' if !in_string => {
                in_comment = true;
                continue;
            }
            _ => {}
        }
        result.push(ch);
    }

    Cow::Owned(result)
}

/// Parse a complete S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    parse_scheme_with_config(input, ParseConfig::default())
}

/// Parse exactly one S-expression with the given configuration
pub fn parse_scheme_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let source = if config.handle_comments {
        strip_comments(input)
    } else {
        Cow::Borrowed(input)
    };
    let source = source.as_ref();

    match terminated(
        |input| parse_sexpr(input, ShouldPrecompileOps::Yes, 0),
        multispace0,
    )
    .parse(source)
    {
        Ok(("", value)) => {
            validate_arity_in_ast(&value)?;
            Ok(value)
        }
        Ok((remaining, _)) => Err(Error::ParseError(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{remaining}'"),
            source,
            source.len() - remaining.len(),
        ))),
        Err(e) => Err(nom_error_to_parse_error(source, e)),
    }
}

/// Parse a program: zero or more top-level forms, with `;` comments.
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    program_forms(input).collect()
}

/// Top-level forms of a program, parsed one at a time.
///
/// Each form is parsed and arity-checked only when requested, so a caller
/// evaluating as it goes keeps the effects of the forms before a bad one.
/// Iteration ends after the first error.
pub fn program_forms(input: &str) -> ProgramForms<'_> {
    ProgramForms {
        source: strip_comments(input),
        offset: 0,
        done: false,
    }
}

pub struct ProgramForms<'a> {
    source: Cow<'a, str>,
    offset: usize,
    done: bool,
}

impl Iterator for ProgramForms<'_> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match next_form(&self.source, self.offset) {
            Ok(Some((form, end))) => {
                self.offset = end;
                Some(Ok(form))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Parse the form starting at byte `offset` of a comment-free program.
/// Returns the form and the offset just past it, or `None` at end of input.
fn next_form(source: &str, offset: usize) -> Result<Option<(Value, usize)>, Error> {
    let after_ws = source[offset..].trim_start();
    if after_ws.is_empty() {
        return Ok(None);
    }

    let (remaining, form) = parse_sexpr(after_ws, ShouldPrecompileOps::Yes, 0)
        .map_err(|e| nom_error_to_parse_error(source, e))?;
    let end = source.len() - remaining.len();

    // Adjacent atoms need a delimiter: `123abc` is not `123` followed by `abc`
    let consumed = &after_ws[..after_ws.len() - remaining.len()];
    let delimited = remaining.is_empty()
        || remaining.starts_with(|c: char| c.is_whitespace() || c == '(')
        || consumed.ends_with([')', '"']);
    if !delimited {
        let near: String = remaining.chars().take(10).collect();
        return Err(Error::ParseError(ParseError::with_context(
            ParseErrorKind::InvalidSyntax,
            format!("Invalid syntax near '{near}'"),
            source,
            end,
        )));
    }

    validate_arity_in_ast(&form)?;
    Ok(Some((form, end)))
}

/// Recursively validate arity of every PrecompiledOp in a parsed AST
fn validate_arity_in_ast(value: &Value) -> Result<(), Error> {
    match value {
        Value::PrecompiledOp { op, args } => {
            if let Err(Error::ArityError { expected, got, .. }) = op.validate_arity(args.len()) {
                return Err(Error::arity_error_with_expr(
                    expected,
                    got,
                    format!("{}", value.to_uncompiled_form()),
                ));
            }
            for arg in args {
                validate_arity_in_ast(arg)?;
            }
        }
        Value::List(elements) => {
            for element in elements {
                validate_arity_in_ast(element)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),
        SuccessPrecompiledOp(&'static str, Vec<Value>),
        /// Compared after converting back to uncompiled form (quote shorthand)
        SemanticallyEquivalent(Value),
        SpecificError(&'static str),
        AnyError,
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    fn precompiled_op(scheme_id: &'static str, args: Vec<Value>) -> ParseTestResult {
        SuccessPrecompiledOp(scheme_id, args)
    }

    fn assert_round_trip(test_id: &str, actual: &Value) {
        let displayed = format!("{actual}");
        let reparsed = parse_scheme(&displayed).unwrap_or_else(|e| {
            panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
        });
        assert_eq!(displayed, format!("{reparsed}"), "{test_id}: round-trip mismatch");
    }

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);

            match (parse_scheme(input), expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");
                    assert_round_trip(&test_id, &actual);
                }
                (Ok(actual), SuccessPrecompiledOp(expected_id, expected_args)) => {
                    let Value::PrecompiledOp { op, args } = &actual else {
                        panic!("{test_id}: expected PrecompiledOp, got {actual:?}");
                    };
                    assert_eq!(op.scheme_id, *expected_id, "{test_id}: op mismatch");
                    assert_eq!(args, expected_args, "{test_id}: args mismatch");
                    assert_round_trip(&test_id, &actual);
                }
                (Ok(actual), SemanticallyEquivalent(expected_val)) => {
                    assert_eq!(
                        actual.to_uncompiled_form(),
                        *expected_val,
                        "{test_id}: semantic equivalence mismatch"
                    );
                    assert_round_trip(&test_id, &actual);
                }
                (Err(_), AnyError) => {}
                (Err(err), SpecificError(expected_text)) => {
                    let error_msg = format!("{err}");
                    assert!(
                        error_msg.contains(expected_text),
                        "{test_id}: error should contain '{expected_text}', got '{error_msg}'"
                    );
                }
                (Ok(actual), AnyError | SpecificError(_)) => {
                    panic!("{test_id}: expected error, got {actual:?}");
                }
                (Err(err), _) => panic!("{test_id}: expected success, got error {err:?}"),
            }
        }
    }

    #[test]
    fn test_parser_comprehensive() {
        let test_cases = vec![
            // Numbers
            ("42", success(42)),
            ("-5", success(-5)),
            ("#x1A", success(26)),
            ("#X1a", success(26)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            ("3.14", AnyError),
            ("#xG", AnyError),
            ("123abc", AnyError),
            ("99999999999999999999", AnyError),
            // Symbols
            ("foo", success(sym("foo"))),
            (">=", success(sym(">="))),
            ("test-name?", success(sym("test-name?"))),
            ("-abc", success(sym("-abc"))),
            ("-42name", AnyError),
            ("test@home", AnyError),
            // Booleans
            ("#t", success(true)),
            ("#f", success(false)),
            ("#true", AnyError),
            // Strings
            ("\"hello world\"", success("hello world")),
            (r#""hello\nworld""#, success("hello\nworld")),
            (r#""quote\"test""#, success("quote\"test")),
            (r#""backslash\\test""#, success("backslash\\test")),
            (r#""other\xchar""#, AnyError),
            (r#""unterminated"#, AnyError),
            ("\"\"", success("")),
            // Lists
            ("()", success(nil())),
            ("(   )", success(nil())),
            ("(1 2 3)", success([1, 2, 3])),
            (
                "(1 hello \"world\" #t)",
                success([val(1), sym("hello"), val("world"), val(true)]),
            ),
            ("(foo 1 2)", success([sym("foo"), val(1), val(2)])),
            ("( 1   2\t\n3 )", success([1, 2, 3])),
            ("(((1)))", success([val([val([val(1)])])])),
            // Builtins in operator position become PrecompiledOps
            ("(+ 1 2)", precompiled_op("+", vec![val(1), val(2)])),
            (
                "(if #t 1 2)",
                precompiled_op("if", vec![val(true), val(1), val(2)]),
            ),
            ("(begin 1 2)", precompiled_op("begin", vec![val(1), val(2)])),
            // Quote
            (
                "'foo",
                SemanticallyEquivalent(val(vec![sym("quote"), sym("foo")])),
            ),
            (
                "'(1 (+ 2 3))",
                SemanticallyEquivalent(val(vec![
                    sym("quote"),
                    val(vec![val(1), val(vec![sym("+"), val(2), val(3)])]),
                ])),
            ),
            ("(quote foo)", precompiled_op("quote", vec![sym("foo")])),
            // A symbol that merely starts with "quote" is not the quote form
            ("(quoted-name 1)", success([sym("quoted-name"), val(1)])),
            // Syntax errors
            ("(1 2 3", SpecificError("ParseError")),
            ("(1 2))", SpecificError("Unexpected remaining input")),
            (")", SpecificError("ParseError")),
            ("", SpecificError("ParseError")),
            ("1 2", SpecificError("ParseError")),
            // Parse-time arity errors
            ("(if #t 1)", SpecificError("ArityError")),
            ("(and)", SpecificError("ArityError")),
            ("(not #t #f)", SpecificError("ArityError")),
            ("(list (not) 42)", SpecificError("ArityError")),
            ("(quote)", SpecificError("ArityError")),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_parser_depth_limits() {
        let parens_under_limit = format!(
            "{}unbound{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        let parens_at_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH),
            ")".repeat(MAX_PARSE_DEPTH)
        );

        assert!(parse_scheme(&parens_under_limit).is_ok());
        let err = parse_scheme(&parens_at_limit).unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError {
                kind: ParseErrorKind::TooDeeplyNested,
                ..
            })
        ));
    }

    #[test]
    fn test_incomplete_input_kind() {
        for input in ["(+ 1 (- 2", "", "   "] {
            let err = parse_scheme(input).unwrap_err();
            assert!(
                matches!(
                    &err,
                    Error::ParseError(ParseError {
                        kind: ParseErrorKind::Incomplete,
                        ..
                    })
                ),
                "{input:?} should be incomplete, got {err:?}"
            );
        }
    }

    #[test]
    fn test_comments() {
        let config = ParseConfig {
            handle_comments: true,
        };
        let parsed = parse_scheme_with_config("(+ 1 ; one\n 2) ; done", config).unwrap();
        assert_eq!(format!("{parsed}"), "(+ 1 2)");

        let parsed = parse_scheme_with_config("\"a;b\" ; string keeps semicolon", config).unwrap();
        assert_eq!(parsed, val("a;b"));

        // Without comment handling the semicolon is a syntax error
        assert!(parse_scheme("(+ 1 2) ; done").is_err());
    }

    #[test]
    fn test_parse_program() {
        let forms = parse_program("(define x 1) ; first\n(+ x 2)\n'sym \"s\"").unwrap();
        let rendered: Vec<String> = forms.iter().map(|f| format!("{f}")).collect();
        assert_eq!(rendered, vec!["(define x 1)", "(+ x 2)", "(quote sym)", "\"s\""]);

        assert!(parse_program("").unwrap().is_empty());
        assert!(parse_program("  ; only a comment\n").unwrap().is_empty());
        assert_eq!(parse_program("(a)(b)").unwrap().len(), 2);

        assert!(parse_program("123abc").is_err());
        assert!(parse_program("(+ 1 2) (").is_err());
        assert!(matches!(
            parse_program("(if #t 1)"),
            Err(Error::ArityError { .. })
        ));
    }

    #[test]
    fn test_program_forms_stop_at_first_bad_form() {
        let mut forms = program_forms("(define a 1) ; ok\n(car 1 2) (define b 2)");

        let first = forms.next().unwrap().unwrap();
        assert_eq!(format!("{first}"), "(define a 1)");
        assert!(matches!(forms.next(), Some(Err(Error::ArityError { .. }))));
        assert!(forms.next().is_none());

        let mut forms = program_forms("1 (+ 2");
        assert_eq!(forms.next().unwrap().unwrap(), val(1));
        assert!(matches!(
            forms.next(),
            Some(Err(Error::ParseError(ParseError {
                kind: ParseErrorKind::Incomplete,
                ..
            })))
        ));
        assert!(forms.next().is_none());
    }
}
