//! Guard expressions.
//!
//! Guards are boolean expressions written between square brackets after a
//! transition's event. They reference the runtime context through `ctx.`
//! fields:
//!
//! - `ctx.field` - context field access (truthy check)
//! - `ctx.field.nested` - nested field access
//! - `ctx.field == value` - equality (strings, numbers, booleans, null)
//! - `ctx.field != value` - inequality
//! - `ctx.field > value`, `>=`, `<`, `<=` - numeric comparisons
//! - `!expr` - logical NOT
//! - `expr && expr` - logical AND (higher precedence than OR)
//! - `expr || expr` - logical OR
//! - `(expr)` - grouping for precedence control
//!
//! Examples:
//! - `ctx.amount > 100 && ctx.approved`
//! - `(ctx.a || ctx.b) && !ctx.c`
//! - `ctx.status == "active"`
//!
//! [`GuardExpr`]'s `Display` is canonical: printing and re-parsing yields an
//! equal expression.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A parsed guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardExpr {
    /// Context field is truthy.
    Truthy(String),
    /// Equality comparison.
    Eq(String, Value),
    /// Inequality comparison.
    Ne(String, Value),
    /// Greater than.
    Gt(String, f64),
    /// Greater or equal.
    Ge(String, f64),
    /// Less than.
    Lt(String, f64),
    /// Less or equal.
    Le(String, f64),
    /// Logical AND.
    And(Box<GuardExpr>, Box<GuardExpr>),
    /// Logical OR.
    Or(Box<GuardExpr>, Box<GuardExpr>),
    /// Logical NOT.
    Not(Box<GuardExpr>),
}

/// A guard parse failure. `offset` counts characters from the start of the
/// guard text.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardError {
    pub offset: usize,
    pub reason: String,
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.reason, self.offset)
    }
}

impl std::error::Error for GuardError {}

impl GuardExpr {
    /// Parses a guard expression from a string.
    pub fn parse(s: &str) -> Result<Self, GuardError> {
        let mut parser = Parser::new(s);
        parser.skip_whitespace();
        if parser.at_end() {
            return Err(parser.error("empty guard expression"));
        }

        let expr = parser.parse_expr()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Evaluates the guard against a context.
    pub fn evaluate(&self, ctx: &Value) -> bool {
        match self {
            GuardExpr::Truthy(field) => is_truthy(get_field(ctx, field)),
            GuardExpr::Eq(field, expected) => values_equal(get_field(ctx, field), expected),
            GuardExpr::Ne(field, expected) => !values_equal(get_field(ctx, field), expected),
            GuardExpr::Gt(field, expected) => compare(ctx, field, |v| v > *expected),
            GuardExpr::Ge(field, expected) => compare(ctx, field, |v| v >= *expected),
            GuardExpr::Lt(field, expected) => compare(ctx, field, |v| v < *expected),
            GuardExpr::Le(field, expected) => compare(ctx, field, |v| v <= *expected),
            GuardExpr::And(left, right) => left.evaluate(ctx) && right.evaluate(ctx),
            GuardExpr::Or(left, right) => left.evaluate(ctx) || right.evaluate(ctx),
            GuardExpr::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// Returns true if `self` and `other` can never hold at the same time.
    ///
    /// The test is sound but incomplete: `false` means "could not prove
    /// exclusivity", not "overlapping".
    pub fn excludes(&self, other: &GuardExpr) -> bool {
        self.excludes_directed(other) || other.excludes_directed(self)
    }

    fn excludes_directed(&self, other: &GuardExpr) -> bool {
        match (self, other) {
            (GuardExpr::Not(inner), _) if **inner == *other => true,
            (GuardExpr::And(left, right), _) => left.excludes(other) || right.excludes(other),
            (GuardExpr::Or(left, right), _) => left.excludes(other) && right.excludes(other),
            (GuardExpr::Eq(f1, v1), GuardExpr::Eq(f2, v2)) => f1 == f2 && !values_equal(v1, v2),
            (GuardExpr::Eq(f1, v1), GuardExpr::Ne(f2, v2)) => f1 == f2 && values_equal(v1, v2),
            (GuardExpr::Truthy(f1), GuardExpr::Eq(f2, v)) => f1 == f2 && !is_truthy(v),
            _ => match (self.numeric_range(), other.numeric_range()) {
                (Some((f1, r1)), Some((f2, r2))) => f1 == f2 && r1.is_disjoint(&r2),
                _ => false,
            },
        }
    }

    fn numeric_range(&self) -> Option<(&str, Range)> {
        let range = match self {
            GuardExpr::Eq(field, Value::Number(n)) => {
                let n = n.as_f64()?;
                (field, Range::closed(n, n))
            }
            GuardExpr::Gt(field, n) => (field, Range::above(*n, false)),
            GuardExpr::Ge(field, n) => (field, Range::above(*n, true)),
            GuardExpr::Lt(field, n) => (field, Range::below(*n, false)),
            GuardExpr::Le(field, n) => (field, Range::below(*n, true)),
            _ => return None,
        };
        Some((range.0.as_str(), range.1))
    }

    fn precedence(&self) -> u8 {
        match self {
            GuardExpr::Or(..) => 1,
            GuardExpr::And(..) => 2,
            GuardExpr::Not(_) => 3,
            _ => 4,
        }
    }

    fn fmt_at(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            f.write_str("(")?;
            self.fmt_at(f, 0)?;
            return f.write_str(")");
        }

        match self {
            GuardExpr::Truthy(field) => write!(f, "ctx.{}", field),
            GuardExpr::Eq(field, value) => {
                write!(f, "ctx.{} == ", field)?;
                write_value(f, value)
            }
            GuardExpr::Ne(field, value) => {
                write!(f, "ctx.{} != ", field)?;
                write_value(f, value)
            }
            GuardExpr::Gt(field, n) => write!(f, "ctx.{} > {}", field, n),
            GuardExpr::Ge(field, n) => write!(f, "ctx.{} >= {}", field, n),
            GuardExpr::Lt(field, n) => write!(f, "ctx.{} < {}", field, n),
            GuardExpr::Le(field, n) => write!(f, "ctx.{} <= {}", field, n),
            // Both operators parse left-associative, so a right operand of
            // the same kind needs parentheses to keep its shape.
            GuardExpr::Or(left, right) => {
                left.fmt_at(f, 1)?;
                f.write_str(" || ")?;
                right.fmt_at(f, 2)
            }
            GuardExpr::And(left, right) => {
                left.fmt_at(f, 2)?;
                f.write_str(" && ")?;
                right.fmt_at(f, 3)
            }
            GuardExpr::Not(inner) => {
                f.write_str("!")?;
                inner.fmt_at(f, 3)
            }
        }
    }
}

impl fmt::Display for GuardExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, 0)
    }
}

impl Serialize for GuardExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => {
            f.write_str("\"")?;
            for c in s.chars() {
                match c {
                    '"' => f.write_str("\\\"")?,
                    '\\' => f.write_str("\\\\")?,
                    '\n' => f.write_str("\\n")?,
                    '\t' => f.write_str("\\t")?,
                    '\r' => f.write_str("\\r")?,
                    c => write!(f, "{}", c)?,
                }
            }
            f.write_str("\"")
        }
        other => write!(f, "{}", other),
    }
}

/// A numeric interval used to prove comparisons disjoint.
#[derive(Debug, Clone, Copy)]
struct Range {
    lo: f64,
    lo_inclusive: bool,
    hi: f64,
    hi_inclusive: bool,
}

impl Range {
    fn closed(lo: f64, hi: f64) -> Self {
        Self {
            lo,
            lo_inclusive: true,
            hi,
            hi_inclusive: true,
        }
    }

    fn above(lo: f64, inclusive: bool) -> Self {
        Self {
            lo,
            lo_inclusive: inclusive,
            hi: f64::INFINITY,
            hi_inclusive: false,
        }
    }

    fn below(hi: f64, inclusive: bool) -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            lo_inclusive: false,
            hi,
            hi_inclusive: inclusive,
        }
    }

    fn is_disjoint(&self, other: &Range) -> bool {
        ends_before(self.hi, self.hi_inclusive, other.lo, other.lo_inclusive)
            || ends_before(other.hi, other.hi_inclusive, self.lo, self.lo_inclusive)
    }
}

fn ends_before(hi: f64, hi_inclusive: bool, lo: f64, lo_inclusive: bool) -> bool {
    hi < lo || (hi == lo && !(hi_inclusive && lo_inclusive))
}

fn get_field<'a>(ctx: &'a Value, field: &str) -> &'a Value {
    let mut current = ctx;
    for part in field.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part).unwrap_or(&Value::Null);
            }
            _ => return &Value::Null,
        }
    }
    current
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .map(|(a, b)| (a - b).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn compare(ctx: &Value, field: &str, op: impl Fn(f64) -> bool) -> bool {
    match get_field(ctx, field) {
        Value::Number(n) => n.as_f64().map(op).unwrap_or(false),
        _ => false,
    }
}

/// Recursive descent parser for guard expressions.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error_at(&self, pos: usize, reason: impl Into<String>) -> GuardError {
        GuardError {
            offset: self.input[..pos].chars().count(),
            reason: reason.into(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> GuardError {
        self.error_at(self.pos, reason)
    }

    fn parse_expr(&mut self) -> Result<GuardExpr, GuardError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<GuardExpr, GuardError> {
        let mut left = self.parse_and()?;
        self.skip_whitespace();

        while self.eat("||") {
            let right = self.parse_and()?;
            left = GuardExpr::Or(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<GuardExpr, GuardError> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();

        while self.eat("&&") {
            let right = self.parse_unary()?;
            left = GuardExpr::And(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<GuardExpr, GuardError> {
        self.skip_whitespace();

        if self.peek_char() == Some('!') {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(GuardExpr::Not(Box::new(inner)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<GuardExpr, GuardError> {
        self.skip_whitespace();

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let expr = self.parse_expr()?;
            self.skip_whitespace();
            if self.peek_char() != Some(')') {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            return Ok(expr);
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<GuardExpr, GuardError> {
        let field = self.parse_field()?;
        self.skip_whitespace();

        // Two-character operators first so `>=` is not read as `>`.
        if self.eat("==") {
            return Ok(GuardExpr::Eq(field, self.parse_value()?));
        }
        if self.eat("!=") {
            return Ok(GuardExpr::Ne(field, self.parse_value()?));
        }
        if self.eat(">=") {
            return Ok(GuardExpr::Ge(field, self.parse_number()?));
        }
        if self.eat("<=") {
            return Ok(GuardExpr::Le(field, self.parse_number()?));
        }
        if self.eat(">") {
            return Ok(GuardExpr::Gt(field, self.parse_number()?));
        }
        if self.eat("<") {
            return Ok(GuardExpr::Lt(field, self.parse_number()?));
        }

        Ok(GuardExpr::Truthy(field))
    }

    fn parse_field(&mut self) -> Result<String, GuardError> {
        if !self.peek_str("ctx.") {
            return Err(self.error("field must start with 'ctx.'"));
        }
        self.pos += 4;
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let field = &self.input[start..self.pos];
        if field.is_empty() {
            return Err(self.error_at(start, "empty field name"));
        }
        if field.split('.').any(str::is_empty) {
            return Err(self.error_at(start, format!("malformed field path '{}'", field)));
        }

        Ok(field.to_string())
    }

    fn parse_value(&mut self) -> Result<Value, GuardError> {
        self.skip_whitespace();

        if self.eat_word("true") {
            return Ok(Value::Bool(true));
        }
        if self.eat_word("false") {
            return Ok(Value::Bool(false));
        }
        if self.eat_word("null") {
            return Ok(Value::Null);
        }
        if self.peek_char() == Some('"') {
            return self.parse_string();
        }

        let start = self.pos;
        let num = self.parse_number()?;
        serde_json::Number::from_f64(num)
            .map(Value::Number)
            .ok_or_else(|| self.error_at(start, "number out of range"))
    }

    fn parse_string(&mut self) -> Result<Value, GuardError> {
        let start = self.pos;
        self.pos += 1;

        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
            match c {
                '"' => return Ok(Value::String(out)),
                '\\' => {
                    let escaped = self
                        .peek_char()
                        .ok_or_else(|| self.error_at(start, "unterminated string"))?;
                    self.pos += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '"' | '\\' => escaped,
                        other => {
                            return Err(self.error(format!("unknown escape '\\{}'", other)));
                        }
                    });
                }
                c => out.push(c),
            }
        }

        Err(self.error_at(start, "unterminated string"))
    }

    fn parse_number(&mut self) -> Result<f64, GuardError> {
        self.skip_whitespace();
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.pos += 1;
        }
        self.skip_digits();

        if self.peek_char() == Some('.') {
            self.pos += 1;
            self.skip_digits();
        }

        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.pos += 1;
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.pos += 1;
            }
            self.skip_digits();
        }

        let num_str = &self.input[start..self.pos];
        match num_str.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            Ok(_) => Err(self.error_at(start, format!("number out of range: '{}'", num_str))),
            Err(_) => Err(self.error_at(start, format!("invalid number: '{}'", num_str))),
        }
    }

    fn skip_digits(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    /// Consumes `s` (and trailing whitespace) if it is next.
    fn eat(&mut self, s: &str) -> bool {
        if self.peek_str(s) {
            self.pos += s.len();
            self.skip_whitespace();
            true
        } else {
            false
        }
    }

    /// Like [`Parser::eat`] but only matches a whole word.
    fn eat_word(&mut self, word: &str) -> bool {
        let rest = &self.input[self.pos..];
        if !rest.starts_with(word) {
            return false;
        }
        let boundary = rest[word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'));
        if boundary {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}

/// Guard evaluation helpers.
pub struct GuardEvaluator;

impl GuardEvaluator {
    /// Evaluates a guard expression against context.
    pub fn evaluate(guard: &GuardExpr, ctx: &Value) -> bool {
        guard.evaluate(ctx)
    }

    /// Evaluates an optional guard (None = always true).
    pub fn evaluate_opt(guard: Option<&GuardExpr>, ctx: &Value) -> bool {
        guard.map(|g| g.evaluate(ctx)).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(s: &str) -> GuardExpr {
        GuardExpr::parse(s).unwrap()
    }

    #[test]
    fn test_truthy_check() {
        let guard = parse("ctx.enabled");
        assert!(guard.evaluate(&json!({"enabled": true})));
        assert!(!guard.evaluate(&json!({"enabled": false})));
        assert!(!guard.evaluate(&json!({"enabled": null})));
        assert!(!guard.evaluate(&json!({})));
    }

    #[test]
    fn test_equality() {
        let guard = parse("ctx.status == \"active\"");
        assert!(guard.evaluate(&json!({"status": "active"})));
        assert!(!guard.evaluate(&json!({"status": "inactive"})));
    }

    #[test]
    fn test_numeric_comparison() {
        let guard = parse("ctx.amount > 100");
        assert!(guard.evaluate(&json!({"amount": 150})));
        assert!(!guard.evaluate(&json!({"amount": 100})));
        assert!(!guard.evaluate(&json!({"amount": "lots"})));

        let guard = parse("ctx.amount >= 100");
        assert!(guard.evaluate(&json!({"amount": 100})));
    }

    #[test]
    fn test_precedence() {
        // && binds tighter than ||
        let guard = parse("ctx.a && ctx.b || ctx.c");
        assert!(guard.evaluate(&json!({"a": false, "b": false, "c": true})));
        assert!(!guard.evaluate(&json!({"a": true, "b": false, "c": false})));

        let guard = parse("(ctx.a || ctx.b) && ctx.c");
        assert!(!guard.evaluate(&json!({"a": true, "b": true, "c": false})));
    }

    #[test]
    fn test_not_and_nested_fields() {
        let guard = parse("!(ctx.order.paid && ctx.order.shipped)");
        assert!(guard.evaluate(&json!({"order": {"paid": true}})));
        assert!(!guard.evaluate(&json!({"order": {"paid": true, "shipped": true}})));

        let guard = parse("!!ctx.a");
        assert!(guard.evaluate(&json!({"a": 1})));
    }

    #[test]
    fn test_string_escapes() {
        let guard = parse(r#"ctx.name == "say \"hi\"\n""#);
        assert_eq!(
            guard,
            GuardExpr::Eq("name".to_string(), json!("say \"hi\"\n"))
        );
    }

    #[test]
    fn test_display_is_canonical() {
        let cases = [
            ("ctx.a", "ctx.a"),
            ("  ctx.a&&ctx.b ", "ctx.a && ctx.b"),
            ("ctx.a || (ctx.b || ctx.c)", "ctx.a || (ctx.b || ctx.c)"),
            ("(ctx.a || ctx.b) || ctx.c", "ctx.a || ctx.b || ctx.c"),
            ("!(ctx.a && ctx.b)", "!(ctx.a && ctx.b)"),
            ("ctx.n >= 0.5", "ctx.n >= 0.5"),
            ("ctx.n == 42", "ctx.n == 42.0"),
            ("ctx.t > -10", "ctx.t > -10"),
            ("ctx.s != null", "ctx.s != null"),
        ];
        for (input, expected) in cases {
            let guard = parse(input);
            assert_eq!(guard.to_string(), expected, "input: {}", input);
            assert_eq!(parse(&guard.to_string()), guard, "input: {}", input);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(GuardExpr::parse("").is_err());
        assert!(GuardExpr::parse("   ").is_err());
        assert!(GuardExpr::parse("foo.bar").is_err());
        assert!(GuardExpr::parse("ctx.").is_err());
        assert!(GuardExpr::parse("ctx.a..b").is_err());
        assert!(GuardExpr::parse("(ctx.a && ctx.b").is_err());
        assert!(GuardExpr::parse("ctx.name == \"unclosed").is_err());
        assert!(GuardExpr::parse("ctx.value > abc").is_err());
        assert!(GuardExpr::parse("ctx.value == truely").is_err());
    }

    #[test]
    fn test_trailing_input_reports_offset() {
        let err = GuardExpr::parse("ctx.a ctx.b").unwrap_err();
        assert_eq!(err.offset, 6);
        assert_eq!(err.reason, "unexpected trailing input");
    }

    #[test]
    fn test_excludes() {
        let pairs = [
            ("ctx.a", "!ctx.a", true),
            ("ctx.s == \"x\"", "ctx.s == \"y\"", true),
            ("ctx.s == \"x\"", "ctx.s != \"x\"", true),
            ("ctx.n > 10", "ctx.n <= 10", true),
            ("ctx.n >= 10", "ctx.n <= 10", false),
            ("ctx.n < 0", "ctx.n == 5", true),
            ("ctx.a && ctx.n > 3", "ctx.n < 1", true),
            ("ctx.n < 1 || ctx.n > 9", "ctx.n == 5", true),
            ("ctx.n < 1 || ctx.b", "ctx.n == 5", false),
            ("ctx.a", "ctx.a == false", true),
            ("ctx.a", "ctx.b", false),
            ("ctx.n > 10", "ctx.m <= 10", false),
        ];
        for (a, b, expected) in pairs {
            let (a, b) = (parse(a), parse(b));
            assert_eq!(a.excludes(&b), expected, "{} vs {}", a, b);
            assert_eq!(b.excludes(&a), expected, "{} vs {}", b, a);
        }
    }

    #[test]
    fn test_guard_evaluator_helper() {
        let guard = parse("ctx.ok");
        let ctx = json!({"ok": true});

        assert!(GuardEvaluator::evaluate(&guard, &ctx));
        assert!(GuardEvaluator::evaluate_opt(Some(&guard), &ctx));
        assert!(GuardEvaluator::evaluate_opt(None, &json!({})));
    }
}
