//! # Expression engine
//!
//! A small arithmetic/boolean expression language over [`Frame`] columns,
//! parsed with `nom` into an AST and evaluated vectorized. Two consumers:
//!
//! * [`CustomFunctor`](crate::functors::CustomFunctor) — arbitrary derived
//!   quantities typed by the analyst, after its `mag()` textual rewrite.
//! * Row-filter ("query") strings on catalogs, e.g.
//!   `"base_PsfFlux_flux > 100 & ~base_PixelFlags_flag"`.
//!
//! ## Grammar
//! -----------------
//! Binary `+ - * / **`, comparisons `< <= > >= == !=`, boolean `& | ~`,
//! unary minus, parentheses, float literals, bare column identifiers, and the
//! math functions `sin cos exp log log10 sqrt` (`log` is natural log).
//! Precedence follows the usual arithmetic rules; comparisons bind looser
//! than arithmetic, `&` looser still, `|` loosest.
//!
//! ## Column discovery
//! -----------------
//! [`scan_columns`] is a deliberate **best-effort lexical scan** (a regex over
//! identifier-shaped words minus the known function names), not a parse of
//! the grammar above. It may over- or under-approximate the referenced
//! columns for pathological expressions; an under-approximation surfaces at
//! evaluation time as a clear [`SkyframeError::MissingColumn`], never as
//! silently wrong results.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{all_consuming, map, opt, recognize},
    multi::{fold_many0, many0_count},
    number::complete::double,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::frame::{ColumnValues, Frame};
use crate::skyframe_errors::SkyframeError;

/// Identifier-shaped words that are part of the language, not column names.
pub const IGNORED_WORDS: [&str; 7] = ["mag", "sin", "cos", "exp", "log", "log10", "sqrt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sin,
    Cos,
    Exp,
    Log,
    Log10,
    Sqrt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Col(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Call(MathFn, Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn ws<'a, O>(
    inner: impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>> {
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn math_fn(name: &str) -> Option<MathFn> {
    match name {
        "sin" => Some(MathFn::Sin),
        "cos" => Some(MathFn::Cos),
        "exp" => Some(MathFn::Exp),
        "log" => Some(MathFn::Log),
        "log10" => Some(MathFn::Log10),
        "sqrt" => Some(MathFn::Sqrt),
        _ => None,
    }
}

fn atom(input: &str) -> IResult<&str, Expr> {
    let paren = delimited(ws(char('(')), expr_or, ws(char(')')));
    let call = map(
        pair(identifier, delimited(ws(char('(')), expr_or, ws(char(')')))),
        |(name, arg)| match math_fn(name) {
            Some(f) => Expr::Call(f, Box::new(arg)),
            // Unknown callables never reach evaluation: the grammar only
            // defines the math functions, so fail late with a column error.
            None => Expr::Col(format!("{name}(…)")),
        },
    );
    let column = map(identifier, |name: &str| Expr::Col(name.to_string()));
    let number = map(double, Expr::Num);
    ws(alt((paren, call, number, column))).parse(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        map(preceded(ws(char('~')), unary), |e| Expr::Not(Box::new(e))),
        atom,
    ))
    .parse(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = unary(input)?;
    let (input, exponent) = opt(preceded(ws(tag("**")), power)).parse(input)?;
    Ok(match exponent {
        Some(e) => (input, Expr::Bin(BinOp::Pow, Box::new(base), Box::new(e))),
        None => (input, base),
    })
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, init) = power(input)?;
    fold_many0(
        pair(ws(alt((char('*'), char('/')))), power),
        move || init.clone(),
        |acc, (op, rhs)| {
            let op = if op == '*' { BinOp::Mul } else { BinOp::Div };
            Expr::Bin(op, Box::new(acc), Box::new(rhs))
        },
    )
    .parse(input)
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, init) = term(input)?;
    fold_many0(
        pair(ws(alt((char('+'), char('-')))), term),
        move || init.clone(),
        |acc, (op, rhs)| {
            let op = if op == '+' { BinOp::Add } else { BinOp::Sub };
            Expr::Bin(op, Box::new(acc), Box::new(rhs))
        },
    )
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = additive(input)?;
    let (input, rest) = opt(pair(
        ws(alt((
            tag("<="),
            tag(">="),
            tag("=="),
            tag("!="),
            tag("<"),
            tag(">"),
        ))),
        additive,
    ))
    .parse(input)?;
    Ok(match rest {
        Some((op, rhs)) => {
            let op = match op {
                "<" => BinOp::Lt,
                "<=" => BinOp::Le,
                ">" => BinOp::Gt,
                ">=" => BinOp::Ge,
                "==" => BinOp::Eq,
                _ => BinOp::Ne,
            };
            (input, Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
        }
        None => (input, lhs),
    })
}

fn expr_and(input: &str) -> IResult<&str, Expr> {
    let (input, init) = comparison(input)?;
    fold_many0(
        pair(ws(char('&')), comparison),
        move || init.clone(),
        |acc, (_, rhs)| Expr::Bin(BinOp::And, Box::new(acc), Box::new(rhs)),
    )
    .parse(input)
}

fn expr_or(input: &str) -> IResult<&str, Expr> {
    let (input, init) = expr_and(input)?;
    fold_many0(
        pair(ws(char('|')), expr_and),
        move || init.clone(),
        |acc, (_, rhs)| Expr::Bin(BinOp::Or, Box::new(acc), Box::new(rhs)),
    )
    .parse(input)
}

/// Parse an expression string, requiring the whole input to be consumed.
pub fn parse_expression(input: &str) -> Result<Expr, SkyframeError> {
    all_consuming(expr_or)
        .parse(input)
        .map(|(_, e)| e)
        .map_err(|e| SkyframeError::ExpressionParse {
            expr: input.to_string(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Intermediate vectorized value; scalars broadcast lazily.
enum Value {
    Scalar(f64),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl Value {
    fn into_floats(self, n: usize) -> Vec<f64> {
        match self {
            Value::Scalar(x) => vec![x; n],
            Value::Float(v) => v,
            Value::Bool(v) => v.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect(),
        }
    }

    fn into_bools(self, n: usize) -> Vec<bool> {
        match self {
            Value::Scalar(x) => vec![x != 0.0; n],
            Value::Float(v) => v.into_iter().map(|x| x != 0.0).collect(),
            Value::Bool(v) => v,
        }
    }
}

fn frame_value(frame: &Frame, name: &str) -> Result<Value, SkyframeError> {
    match frame.require(name)? {
        ColumnValues::Float(v) => Ok(Value::Float(v.clone())),
        // Null flags count as false under comparison semantics.
        ColumnValues::Bool(v) => Ok(Value::Bool(
            v.iter().map(|b| b.unwrap_or(false)).collect(),
        )),
        ColumnValues::Str(_) => Err(SkyframeError::ColumnTypeMismatch {
            column: name.to_string(),
            expected: "float or bool",
        }),
    }
}

fn eval_value(expr: &Expr, frame: &Frame) -> Result<Value, SkyframeError> {
    let n = frame.len();
    let value = match expr {
        Expr::Num(x) => Value::Scalar(*x),
        Expr::Col(name) => frame_value(frame, name)?,
        Expr::Neg(e) => {
            let v = eval_value(e, frame)?;
            match v {
                Value::Scalar(x) => Value::Scalar(-x),
                other => Value::Float(other.into_floats(n).into_iter().map(|x| -x).collect()),
            }
        }
        Expr::Not(e) => Value::Bool(
            eval_value(e, frame)?
                .into_bools(n)
                .into_iter()
                .map(|b| !b)
                .collect(),
        ),
        Expr::Call(f, arg) => {
            let v = eval_value(arg, frame)?.into_floats(n);
            let op: fn(f64) -> f64 = match f {
                MathFn::Sin => f64::sin,
                MathFn::Cos => f64::cos,
                MathFn::Exp => f64::exp,
                MathFn::Log => f64::ln,
                MathFn::Log10 => f64::log10,
                MathFn::Sqrt => f64::sqrt,
            };
            Value::Float(v.into_iter().map(op).collect())
        }
        Expr::Bin(op, lhs, rhs) => {
            let l = eval_value(lhs, frame)?;
            let r = eval_value(rhs, frame)?;
            match op {
                BinOp::And | BinOp::Or => {
                    let l = l.into_bools(n);
                    let r = r.into_bools(n);
                    let out = l
                        .into_iter()
                        .zip(r)
                        .map(|(a, b)| if *op == BinOp::And { a && b } else { a || b })
                        .collect();
                    Value::Bool(out)
                }
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                    let l = l.into_floats(n);
                    let r = r.into_floats(n);
                    let cmp: fn(f64, f64) -> bool = match op {
                        BinOp::Lt => |a, b| a < b,
                        BinOp::Le => |a, b| a <= b,
                        BinOp::Gt => |a, b| a > b,
                        BinOp::Ge => |a, b| a >= b,
                        BinOp::Eq => |a, b| a == b,
                        _ => |a, b| a != b,
                    };
                    Value::Bool(l.into_iter().zip(r).map(|(a, b)| cmp(a, b)).collect())
                }
                _ => {
                    let l = l.into_floats(n);
                    let r = r.into_floats(n);
                    let f: fn(f64, f64) -> f64 = match op {
                        BinOp::Add => |a, b| a + b,
                        BinOp::Sub => |a, b| a - b,
                        BinOp::Mul => |a, b| a * b,
                        BinOp::Div => |a, b| a / b,
                        _ => f64::powf,
                    };
                    Value::Float(l.into_iter().zip(r).map(|(a, b)| f(a, b)).collect())
                }
            }
        }
    };
    Ok(value)
}

/// Evaluate an expression against a frame, yielding one column.
pub fn evaluate(expr: &Expr, frame: &Frame) -> Result<ColumnValues, SkyframeError> {
    let n = frame.len();
    Ok(match eval_value(expr, frame)? {
        Value::Bool(v) => ColumnValues::Bool(v.into_iter().map(Some).collect()),
        other => ColumnValues::Float(other.into_floats(n)),
    })
}

/// Parse and evaluate a row-filter string, yielding a keep-mask.
pub fn evaluate_predicate(query: &str, frame: &Frame) -> Result<Vec<bool>, SkyframeError> {
    let expr = parse_expression(query)?;
    Ok(match eval_value(&expr, frame)? {
        Value::Bool(v) => v,
        Value::Scalar(x) => vec![x != 0.0; frame.len()],
        Value::Float(v) => v.into_iter().map(|x| x != 0.0).collect(),
    })
}

// ---------------------------------------------------------------------------
// Lexical column discovery and the mag() rewrite
// ---------------------------------------------------------------------------

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z_][a-zA-Z0-9_]*").expect("static regex"));

static MAG_CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"mag\(\s*(\w+)\s*\)").expect("static regex"));

/// Best-effort lexical scan: every identifier-shaped word that is not a known
/// function name. Duplicates removed, first-appearance order kept.
pub fn scan_columns(expr: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in IDENT_RE.find_iter(expr) {
        let word = m.as_str();
        if IGNORED_WORDS.contains(&word) {
            continue;
        }
        if !out.iter().any(|c| c == word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Bare arguments of `mag(...)` calls, in order of appearance.
pub fn mag_arguments(expr: &str) -> Vec<String> {
    MAG_CALL_RE
        .captures_iter(expr)
        .map(|c| c[1].to_string())
        .collect()
}

/// Textually rewrite `mag(x)` to `-2.5*log10(x')`, where `x'` is chosen by
/// `resolve` (typically: `x` itself when it is a real column, otherwise
/// `x_flux`). The rewritten string is then fit for [`parse_expression`].
pub fn rewrite_mag(expr: &str, resolve: impl Fn(&str) -> String) -> String {
    MAG_CALL_RE
        .replace_all(expr, |caps: &regex::Captures| {
            format!("(-2.5*log10({}))", resolve(&caps[1]))
        })
        .into_owned()
}

#[cfg(test)]
mod expr_test {
    use super::*;
    use crate::frame::Frame;
    use approx::assert_relative_eq;

    fn frame() -> Frame {
        let mut f = Frame::new(vec![1, 2, 3]);
        f.insert("a", ColumnValues::Float(vec![1.0, 4.0, 9.0]))
            .unwrap();
        f.insert("b_flux", ColumnValues::Float(vec![100.0, 10.0, 1.0]))
            .unwrap();
        f.insert(
            "good",
            ColumnValues::Bool(vec![Some(true), None, Some(false)]),
        )
        .unwrap();
        f
    }

    #[test]
    fn test_arithmetic_precedence() {
        let e = parse_expression("1 + 2 * 3 ** 2").unwrap();
        let out = evaluate(&e, &frame()).unwrap();
        assert_eq!(out.as_float().unwrap()[0], 19.0);
    }

    #[test]
    fn test_column_math() {
        let e = parse_expression("sqrt(a) + 1").unwrap();
        let out = evaluate(&e, &frame()).unwrap();
        let v = out.as_float().unwrap();
        assert_relative_eq!(v[0], 2.0);
        assert_relative_eq!(v[1], 3.0);
        assert_relative_eq!(v[2], 4.0);
    }

    #[test]
    fn test_predicate_with_null_flag() {
        // Null flags behave as false, so `~good` keeps them.
        let mask = evaluate_predicate("a >= 4 & ~good", &frame()).unwrap();
        assert_eq!(mask, vec![false, true, true]);
    }

    #[test]
    fn test_missing_column_is_clear_error() {
        let e = parse_expression("nope * 2").unwrap();
        let err = evaluate(&e, &frame()).unwrap_err();
        assert!(matches!(err, SkyframeError::MissingColumn(c) if c == "nope"));
    }

    #[test]
    fn test_scan_columns_skips_functions() {
        let cols = scan_columns("mag(b) - sqrt(a) + log10(a)");
        assert_eq!(cols, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_rewrite_mag() {
        let rewritten = rewrite_mag("mag(b) - 1", |name| format!("{name}_flux"));
        assert_eq!(rewritten, "(-2.5*log10(b_flux)) - 1");
        let e = parse_expression(&rewritten).unwrap();
        let out = evaluate(&e, &frame()).unwrap();
        assert_relative_eq!(out.as_float().unwrap()[0], -6.0);
    }

    #[test]
    fn test_parse_failure() {
        assert!(parse_expression("a +* b").is_err());
    }
}
