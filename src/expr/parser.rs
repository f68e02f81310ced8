//! nom grammar for the expression language.
//!
//! ```text
//! expr        := logical_or ( "?" expr ":" expr )?
//! logical_or  := logical_and ( "||" logical_and )*
//! logical_and := equality ( "&&" equality )*
//! equality    := relational ( ("===" | "!==" | "==" | "!=") relational )*
//! relational  := additive ( ("<=" | ">=" | "<" | ">") additive )*
//! additive    := term ( ("+" | "-") term )*
//! term        := unary ( ("*" | "/" | "%") unary )*
//! unary       := ("!" | "-") unary | postfix
//! postfix     := primary ( "." ident "(" args ")" | "." ident | "[" expr "]" )*
//! primary     := number | string | "[" args "]" | "(" expr ")" | ident
//! ```

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{all_consuming, map, map_opt, opt, recognize, value},
    error::{convert_error, VerboseError},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde_json::{Number, Value};

use super::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::error::{MatrixError, Result};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Deepest bracket, ternary or prefix-operator nesting accepted by [`parse`].
pub const MAX_DEPTH: usize = 64;

// ============================================================================
// Public API
// ============================================================================

pub fn parse(source: &str) -> Result<Expr> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(MatrixError::EmptyExpression);
    }
    if nesting_depth(trimmed) > MAX_DEPTH {
        return Err(invalid(trimmed, "expression nested too deeply".to_string()));
    }

    match all_consuming(terminated(expression, multispace0))(trimmed) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(invalid(trimmed, convert_error(trimmed, e)))
        }
        Err(nom::Err::Incomplete(_)) => Err(invalid(trimmed, "incomplete input".to_string())),
    }
}

/// Upper bound on how deep the grammar recurses for `source`. Brackets open a
/// frame, each `?` in a frame nests one more ternary (a `,` starts a new
/// argument), and runs of `!`/`-` nest unary operators. Quoted text is skipped.
fn nesting_depth(source: &str) -> usize {
    let mut frames: Vec<usize> = vec![0];
    let mut prefix_run = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut deepest = 0;

    for c in source.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => frames.push(0),
            ')' | ']' if frames.len() > 1 => {
                frames.pop();
            }
            '?' => {
                if let Some(ternaries) = frames.last_mut() {
                    *ternaries += 1;
                }
            }
            ',' => {
                if let Some(ternaries) = frames.last_mut() {
                    *ternaries = 0;
                }
            }
            _ => {}
        }

        if c == '!' || c == '-' {
            prefix_run += 1;
        } else if !c.is_whitespace() {
            prefix_run = 0;
        }

        let depth = frames.len() - 1 + frames.iter().sum::<usize>() + prefix_run;
        deepest = deepest.max(depth);
    }
    deepest
}

fn invalid(source: &str, message: String) -> MatrixError {
    MatrixError::InvalidExpression {
        source_text: source.to_string(),
        message: message.trim_end().to_string(),
    }
}

// ============================================================================
// Operators
// ============================================================================

fn token<'a>(t: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(multispace0, tag(t))
}

fn expression(i: &str) -> PResult<'_, Expr> {
    let (i, test) = logical_or(i)?;
    let (i, branches) = opt(pair(
        preceded(token("?"), expression),
        preceded(token(":"), expression),
    ))(i)?;

    let expr = match branches {
        Some((then, otherwise)) => {
            Expr::Conditional(Box::new(test), Box::new(then), Box::new(otherwise))
        }
        None => test,
    };
    Ok((i, expr))
}

fn logical_or(i: &str) -> PResult<'_, Expr> {
    let (i, first) = logical_and(i)?;
    let (i, rest) = many0(preceded(token("||"), logical_and))(i)?;
    Ok((i, fold_logical(LogicalOp::Or, first, rest)))
}

fn logical_and(i: &str) -> PResult<'_, Expr> {
    let (i, first) = equality(i)?;
    let (i, rest) = many0(preceded(token("&&"), equality))(i)?;
    Ok((i, fold_logical(LogicalOp::And, first, rest)))
}

fn fold_logical(op: LogicalOp, first: Expr, rest: Vec<Expr>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, rhs| Expr::Logical(op, Box::new(lhs), Box::new(rhs)))
}

fn binary_chain<'a>(
    i: &'a str,
    operand: fn(&'a str) -> PResult<'a, Expr>,
    operator: fn(&'a str) -> PResult<'a, BinaryOp>,
) -> PResult<'a, Expr> {
    let (i, first) = operand(i)?;
    let (i, rest) = many0(pair(operator, operand))(i)?;
    let expr = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    });
    Ok((i, expr))
}

fn equality(i: &str) -> PResult<'_, Expr> {
    binary_chain(i, relational, |i| {
        alt((
            value(BinaryOp::StrictEq, token("===")),
            value(BinaryOp::StrictNe, token("!==")),
            value(BinaryOp::Eq, token("==")),
            value(BinaryOp::Ne, token("!=")),
        ))(i)
    })
}

fn relational(i: &str) -> PResult<'_, Expr> {
    binary_chain(i, additive, |i| {
        alt((
            value(BinaryOp::Le, token("<=")),
            value(BinaryOp::Ge, token(">=")),
            value(BinaryOp::Lt, token("<")),
            value(BinaryOp::Gt, token(">")),
        ))(i)
    })
}

fn additive(i: &str) -> PResult<'_, Expr> {
    binary_chain(i, term, |i| {
        alt((
            value(BinaryOp::Add, token("+")),
            value(BinaryOp::Sub, token("-")),
        ))(i)
    })
}

fn term(i: &str) -> PResult<'_, Expr> {
    binary_chain(i, unary, |i| {
        alt((
            value(BinaryOp::Mul, token("*")),
            value(BinaryOp::Div, token("/")),
            value(BinaryOp::Rem, token("%")),
        ))(i)
    })
}

fn unary(i: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(token("!"), unary), |e| {
            Expr::Unary(UnaryOp::Not, Box::new(e))
        }),
        map(preceded(token("-"), unary), |e| {
            Expr::Unary(UnaryOp::Neg, Box::new(e))
        }),
        postfix,
    ))(i)
}

// ============================================================================
// Member access and calls
// ============================================================================

enum Suffix {
    Method(String, Vec<Expr>),
    Member(String),
    Index(Expr),
}

fn postfix(i: &str) -> PResult<'_, Expr> {
    let (i, base) = primary(i)?;
    let (i, suffixes) = many0(suffix)(i)?;
    let expr = suffixes.into_iter().fold(base, |target, suffix| match suffix {
        Suffix::Method(method, args) => Expr::Call {
            target: Box::new(target),
            method,
            args,
        },
        Suffix::Member(name) => Expr::Member(Box::new(target), name),
        Suffix::Index(key) => Expr::Index(Box::new(target), Box::new(key)),
    });
    Ok((i, expr))
}

fn suffix(i: &str) -> PResult<'_, Suffix> {
    alt((
        map(
            tuple((token("."), identifier, token("("), arguments, token(")"))),
            |(_, name, _, args, _)| Suffix::Method(name.to_string(), args),
        ),
        map(preceded(token("."), identifier), |name| {
            Suffix::Member(name.to_string())
        }),
        map(delimited(token("["), expression, token("]")), Suffix::Index),
    ))(i)
}

fn arguments(i: &str) -> PResult<'_, Vec<Expr>> {
    separated_list0(token(","), expression)(i)
}

// ============================================================================
// Primaries
// ============================================================================

fn primary(i: &str) -> PResult<'_, Expr> {
    alt((
        number,
        map(string_literal, |s| Expr::Literal(Value::String(s))),
        map(delimited(token("["), arguments, token("]")), Expr::Array),
        delimited(token("("), expression, token(")")),
        map(identifier, keyword_or_ident),
    ))(i)
}

fn identifier(i: &str) -> PResult<'_, &str> {
    preceded(
        multispace0,
        recognize(pair(
            alt((alpha1, tag("_"), tag("$"))),
            many0(alt((alphanumeric1, tag("_"), tag("$")))),
        )),
    )(i)
}

fn keyword_or_ident(name: &str) -> Expr {
    match name {
        "true" => Expr::Literal(Value::Bool(true)),
        "false" => Expr::Literal(Value::Bool(false)),
        "null" | "undefined" => Expr::Literal(Value::Null),
        _ => Expr::Ident(name.to_string()),
    }
}

fn number(i: &str) -> PResult<'_, Expr> {
    map_opt(
        preceded(
            multispace0,
            recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        ),
        |text: &str| {
            let value = if text.contains('.') {
                Value::Number(Number::from_f64(text.parse().ok()?)?)
            } else {
                Value::from(text.parse::<i64>().ok()?)
            };
            Some(Expr::Literal(value))
        },
    )(i)
}

fn string_literal(i: &str) -> PResult<'_, String> {
    preceded(multispace0, alt((double_quoted, single_quoted)))(i)
}

fn double_quoted(i: &str) -> PResult<'_, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(none_of("\"\\"), '\\', escape)),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(i)
}

fn single_quoted(i: &str) -> PResult<'_, String> {
    delimited(
        char('\''),
        map(
            opt(escaped_transform(none_of("'\\"), '\\', escape)),
            Option::unwrap_or_default,
        ),
        char('\''),
    )(i)
}

fn escape(i: &str) -> PResult<'_, &'static str> {
    alt((
        value("\\", char('\\')),
        value("\"", char('"')),
        value("'", char('\'')),
        value("\n", char('n')),
        value("\t", char('t')),
        value("\r", char('r')),
    ))(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    fn lit(v: Value) -> Box<Expr> {
        Box::new(Expr::Literal(v))
    }

    #[test]
    fn member_chain() {
        assert_eq!(
            parse("config.os.name").unwrap(),
            Expr::Member(
                Box::new(Expr::Member(ident("config"), "os".into())),
                "name".into()
            )
        );
    }

    #[test]
    fn precedence() {
        // a || b && c == 'x'
        let expr = parse("a || b && c == 'x'").unwrap();
        assert_eq!(
            expr,
            Expr::Logical(
                LogicalOp::Or,
                ident("a"),
                Box::new(Expr::Logical(
                    LogicalOp::And,
                    ident("b"),
                    Box::new(Expr::Binary(BinaryOp::Eq, ident("c"), lit(json!("x"))))
                ))
            )
        );
    }

    #[test]
    fn strict_operators_win_over_loose() {
        assert!(matches!(
            parse("a === b").unwrap(),
            Expr::Binary(BinaryOp::StrictEq, _, _)
        ));
        assert!(matches!(
            parse("a !== b").unwrap(),
            Expr::Binary(BinaryOp::StrictNe, _, _)
        ));
        assert!(matches!(
            parse("a <= 2").unwrap(),
            Expr::Binary(BinaryOp::Le, _, _)
        ));
    }

    #[test]
    fn ternary_and_calls() {
        let expr = parse("os.startsWith('win') ? 'exe' : ''").unwrap();
        let Expr::Conditional(test, then, otherwise) = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*test, Expr::Call { ref method, .. } if method == "startsWith"));
        assert_eq!(*then, Expr::Literal(json!("exe")));
        assert_eq!(*otherwise, Expr::Literal(json!("")));
    }

    #[test]
    fn literals() {
        assert_eq!(parse("42").unwrap(), Expr::Literal(json!(42)));
        assert_eq!(parse("1.5").unwrap(), Expr::Literal(json!(1.5)));
        assert_eq!(parse("undefined").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(
            parse(r#""a\"b""#).unwrap(),
            Expr::Literal(json!("a\"b"))
        );
        assert_eq!(
            parse("['x', config['y']]").unwrap(),
            Expr::Array(vec![
                Expr::Literal(json!("x")),
                Expr::Index(ident("config"), lit(json!("y")))
            ])
        );
    }

    #[test]
    fn empty_and_malformed() {
        assert_eq!(parse("   ").unwrap_err(), MatrixError::EmptyExpression);
        for bad in ["a ==", "config.", "(a", "a = b", "'open"] {
            match parse(bad) {
                Err(MatrixError::InvalidExpression { source_text, .. }) => {
                    assert_eq!(source_text, bad.trim());
                }
                other => panic!("{bad}: expected invalid expression, got {other:?}"),
            }
        }
    }

    fn too_deep(source: &str) -> bool {
        matches!(
            parse(source),
            Err(MatrixError::InvalidExpression { message, .. }) if message == "expression nested too deeply"
        )
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |depth: usize| format!("{}'x'{}", "(".repeat(depth), ")".repeat(depth));

        assert_eq!(parse(&nested(MAX_DEPTH)).unwrap(), Expr::Literal(json!("x")));
        assert!(too_deep(&nested(MAX_DEPTH + 1)));
        assert!(too_deep(&nested(500)));
        assert!(too_deep(&format!("{}x{}", "[".repeat(200), "]".repeat(200))));
        assert!(too_deep(&format!("{}a", "!".repeat(200))));
        assert!(too_deep(&("a ? b : ".repeat(100) + "c")));
    }

    #[test]
    fn quoted_brackets_do_not_count() {
        let text = format!("'{}' + x", "(".repeat(200));
        assert!(matches!(parse(&text).unwrap(), Expr::Binary(BinaryOp::Add, _, _)));

        // Sibling arguments and sequential groups do not add up.
        let wide = vec!["(a ? b : c)"; 100].join(" + ");
        assert!(parse(&wide).is_ok());
    }
}
