//! Parser for the string expression language
//!
//! Filter grammar (keywords are case-insensitive):
//!
//! ```text
//! or      := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | "(" or ")" | predicate
//! predicate := operand [("==" | "=" | "!=" | "<>" | "<" | "<=" | ">" | ">=") operand]
//! operand := Field ["." ("Contains" | "StartsWith" | "EndsWith") "(" operand ")"]
//!          | "string" | 'string' | number | true | false | null | @N
//! ```
//!
//! Sort: `Field [asc|desc], ...`. Projection: `new (Field [as Alias], ...)`,
//! `new {…}` or a bare field list.

use super::ast::{CompareOp, Filter, Operand, ProjectedColumn, Projection, SortKey, TextOp};
use crate::core::error::QueryError;
use crate::core::field::FieldValue;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Param(usize),
    Sym(&'static str),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<>", "<=", ">=", "&&", "||", "=", "<", ">", "!", "(", ")", ",", ".", "{", "}",
];

fn token_regex() -> &'static Regex {
    static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(
            r#"^(?:(?P<num>-?\d+(?:\.\d+)?)|(?P<str>"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')|(?P<param>@\d+)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<sym>==|!=|<>|<=|>=|&&|\|\||[=<>!(),.{}]))"#,
        )
        .expect("token pattern is valid")
    })
}

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, QueryError> {
    let regex = token_regex();
    let mut tokens = Vec::new();
    let mut position = 0;

    while position < input.len() {
        let rest = &input[position..];
        let trimmed = rest.trim_start();
        position += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            break;
        }

        let caps = regex.captures(trimmed).ok_or_else(|| QueryError::Parse {
            expression: input.to_string(),
            position,
            message: format!(
                "unexpected character '{}'",
                trimmed.chars().next().unwrap_or(' ')
            ),
        })?;

        let error = |message: String| QueryError::Parse {
            expression: input.to_string(),
            position,
            message,
        };

        let token = if let Some(m) = caps.name("num") {
            if m.as_str().contains('.') {
                Token::Float(
                    m.as_str()
                        .parse()
                        .map_err(|_| error(format!("invalid number '{}'", m.as_str())))?,
                )
            } else {
                Token::Int(
                    m.as_str()
                        .parse()
                        .map_err(|_| error(format!("invalid number '{}'", m.as_str())))?,
                )
            }
        } else if let Some(m) = caps.name("str") {
            Token::Str(unescape(m.as_str()))
        } else if let Some(m) = caps.name("param") {
            Token::Param(
                m.as_str()[1..]
                    .parse()
                    .map_err(|_| error(format!("invalid parameter '{}'", m.as_str())))?,
            )
        } else if let Some(m) = caps.name("ident") {
            Token::Ident(m.as_str().to_string())
        } else if let Some(m) = caps.name("sym") {
            let sym = SYMBOLS
                .iter()
                .find(|s| **s == m.as_str())
                .copied()
                .ok_or_else(|| error(format!("unexpected symbol '{}'", m.as_str())))?;
            Token::Sym(sym)
        } else {
            return Err(error("unrecognized token".to_string()));
        };

        let len = caps.get(0).map(|m| m.len()).unwrap_or(0);
        tokens.push(Spanned { token, position });
        position += len.max(1);
    }

    Ok(tokens)
}

/// Deepest nesting of `(`, `!`/`not` and method arguments a filter may use
pub const MAX_NESTING_DEPTH: usize = 64;

/// A parsed operand before it is known which side holds the field
#[derive(Debug, Clone)]
enum Term {
    Field(String),
    Value(Operand),
    Text(Filter),
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, QueryError> {
        Ok(Self {
            input,
            tokens: tokenize(input)?,
            pos: 0,
            depth: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.position)
            .unwrap_or(self.input.len())
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::Parse {
            expression: self.input.to_string(),
            position: self.position(),
            message: message.into(),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), QueryError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", sym)))
        }
    }

    fn expect_end(&self) -> Result<(), QueryError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("unexpected trailing input")),
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested<R>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<R, QueryError>,
    ) -> Result<R, QueryError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn ident(&mut self) -> Result<String, QueryError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a field name")),
        }
    }

    // === Filters ===

    fn or_expr(&mut self) -> Result<Filter, QueryError> {
        let mut parts = vec![self.and_expr()?];
        while self.eat_sym("||") || self.eat_keyword("or") {
            parts.push(self.and_expr()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Filter::Or(parts)
        })
    }

    fn and_expr(&mut self) -> Result<Filter, QueryError> {
        let mut parts = vec![self.unary()?];
        while self.eat_sym("&&") || self.eat_keyword("and") {
            parts.push(self.unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Filter::And(parts)
        })
    }

    fn unary(&mut self) -> Result<Filter, QueryError> {
        if self.eat_sym("!") || self.eat_keyword("not") {
            let inner = self.nested(Self::unary)?;
            return Ok(Filter::Not(Box::new(inner)));
        }
        if self.eat_sym("(") {
            let inner = self.nested(Self::or_expr)?;
            self.expect_sym(")")?;
            return Ok(inner);
        }
        self.predicate()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek() {
            Some(Token::Sym("==")) | Some(Token::Sym("=")) => CompareOp::Eq,
            Some(Token::Sym("!=")) | Some(Token::Sym("<>")) => CompareOp::Ne,
            Some(Token::Sym("<")) => CompareOp::Lt,
            Some(Token::Sym("<=")) => CompareOp::Le,
            Some(Token::Sym(">")) => CompareOp::Gt,
            Some(Token::Sym(">=")) => CompareOp::Ge,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn predicate(&mut self) -> Result<Filter, QueryError> {
        let start = self.position();
        let left = self.term()?;

        let Some(op) = self.compare_op() else {
            return match left {
                Term::Text(filter) => Ok(filter),
                // a bare boolean field
                Term::Field(field) => Ok(Filter::Compare {
                    field,
                    op: CompareOp::Eq,
                    value: Operand::Value(FieldValue::Boolean(true)),
                }),
                Term::Value(_) => Err(self.error("expected a comparison")),
            };
        };

        let right = self.term()?;
        let (field, op, value) = match (left, right) {
            (Term::Field(field), Term::Value(value)) => (field, op, value),
            (Term::Value(value), Term::Field(field)) => (field, op.flipped(), value),
            (Term::Text(_), _) | (_, Term::Text(_)) => {
                return Err(QueryError::Parse {
                    expression: self.input.to_string(),
                    position: start,
                    message: "string methods cannot be compared".to_string(),
                });
            }
            _ => {
                return Err(QueryError::Parse {
                    expression: self.input.to_string(),
                    position: start,
                    message: "a comparison needs exactly one field and one value".to_string(),
                });
            }
        };

        if value == Operand::Value(FieldValue::Null) {
            return match op {
                CompareOp::Eq => Ok(Filter::IsNull {
                    field,
                    negated: false,
                }),
                CompareOp::Ne => Ok(Filter::IsNull {
                    field,
                    negated: true,
                }),
                _ => Err(QueryError::Parse {
                    expression: self.input.to_string(),
                    position: start,
                    message: format!("operator '{}' cannot be used with null", op.as_str()),
                }),
            };
        }

        Ok(Filter::Compare { field, op, value })
    }

    fn term(&mut self) -> Result<Term, QueryError> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Term::Value(Operand::Value(FieldValue::String(s)))),
            Some(Token::Int(i)) => Ok(Term::Value(Operand::Value(FieldValue::Integer(i)))),
            Some(Token::Float(v)) => Ok(Term::Value(Operand::Value(FieldValue::Float(v)))),
            Some(Token::Param(index)) => Ok(Term::Value(Operand::Parameter(index))),
            Some(Token::Ident(name)) => {
                match name.to_ascii_lowercase().as_str() {
                    "true" => return Ok(Term::Value(Operand::Value(FieldValue::Boolean(true)))),
                    "false" => {
                        return Ok(Term::Value(Operand::Value(FieldValue::Boolean(false))));
                    }
                    "null" => return Ok(Term::Value(Operand::Value(FieldValue::Null))),
                    _ => {}
                }

                if !self.eat_sym(".") {
                    return Ok(Term::Field(name));
                }

                let method = self.ident()?;
                let op = TextOp::from_name(&method)
                    .ok_or_else(|| self.error(format!("unknown method '{}'", method)))?;
                self.expect_sym("(")?;
                let argument = match self.nested(Self::term)? {
                    Term::Value(value) => value,
                    _ => return Err(self.error("method argument must be a value")),
                };
                self.expect_sym(")")?;
                Ok(Term::Text(Filter::Text {
                    field: name,
                    op,
                    value: argument,
                }))
            }
            Some(Token::Sym(s)) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected '{}'", s)))
            }
            None => Err(self.error("unexpected end of expression")),
        }
    }

    // === Sorting ===

    fn sort_keys(&mut self) -> Result<Vec<SortKey>, QueryError> {
        let mut keys = Vec::new();
        loop {
            let field = self.ident()?;
            let descending = if self.eat_keyword("desc") || self.eat_keyword("descending") {
                true
            } else {
                if !self.eat_keyword("asc") {
                    self.eat_keyword("ascending");
                }
                false
            };
            keys.push(SortKey { field, descending });
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_end()?;
        Ok(keys)
    }

    // === Projection ===

    fn projection(&mut self) -> Result<Projection, QueryError> {
        let closing = if self.eat_keyword("new") {
            if self.eat_sym("(") {
                Some(")")
            } else if self.eat_sym("{") {
                Some("}")
            } else {
                return Err(self.error("expected '(' or '{' after new"));
            }
        } else {
            None
        };

        let mut columns = Vec::new();
        loop {
            let field = self.ident()?;
            let alias = if self.eat_keyword("as") {
                Some(self.ident()?)
            } else {
                None
            };
            columns.push(ProjectedColumn { field, alias });
            if !self.eat_sym(",") {
                break;
            }
        }

        if let Some(closing) = closing {
            self.expect_sym(closing)?;
        }
        self.expect_end()?;
        Ok(Projection { columns })
    }
}

/// Parse a filter expression
pub fn parse_filter(input: &str) -> Result<Filter, QueryError> {
    let mut parser = Parser::new(input)?;
    if parser.peek().is_none() {
        return Err(parser.error("empty filter"));
    }
    let filter = parser.or_expr()?;
    parser.expect_end()?;
    Ok(filter)
}

/// Parse a sort expression such as `ReleaseDate desc, Title`
pub fn parse_order_by(input: &str) -> Result<Vec<SortKey>, QueryError> {
    let mut parser = Parser::new(input)?;
    if parser.peek().is_none() {
        return Ok(Vec::new());
    }
    parser.sort_keys()
}

/// Parse a projection such as `new (Title, ReleaseDate as Released)`
pub fn parse_projection(input: &str) -> Result<Projection, QueryError> {
    let mut parser = Parser::new(input)?;
    if parser.peek().is_none() {
        return Err(parser.error("empty projection"));
    }
    parser.projection()
}

/// Split an include list (`Artist, Songs`) into navigation names
pub fn parse_includes(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_comparison() {
        let filter = parse_filter("Id == 3").expect("parses");
        assert_eq!(filter, Filter::field("Id").eq(3i64));
    }

    #[test]
    fn test_parse_single_equals_and_sql_not_equal() {
        assert_eq!(
            parse_filter("Name = 'Queen'").expect("parses"),
            Filter::field("Name").eq("Queen")
        );
        assert_eq!(
            parse_filter("Name <> @0").expect("parses"),
            Filter::field("Name").ne(Operand::param(0))
        );
    }

    #[test]
    fn test_parse_method_call_and_logic() {
        let filter = parse_filter(r#"Title.Contains(@0) and not IsSolo || Id >= 2"#)
            .expect("parses");
        let expected = Filter::Or(vec![
            Filter::And(vec![
                Filter::field("Title").contains(Operand::param(0)),
                Filter::Not(Box::new(Filter::field("IsSolo").eq(true))),
            ]),
            Filter::field("Id").ge(2i64),
        ]);
        assert_eq!(filter, expected);
    }

    #[test]
    fn test_parse_flips_literal_on_left() {
        assert_eq!(
            parse_filter("5 < Id").expect("parses"),
            Filter::field("Id").gt(5i64)
        );
    }

    #[test]
    fn test_parse_null_comparisons() {
        assert_eq!(
            parse_filter("RoleId == null").expect("parses"),
            Filter::field("RoleId").is_null()
        );
        assert_eq!(
            parse_filter("RoleId != null").expect("parses"),
            Filter::field("RoleId").is_not_null()
        );
        assert!(parse_filter("RoleId > null").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let text = r#"(IsSolo == true || Name.StartsWith("The \"Best\"")) && !(Id == @1)"#;
        let filter = parse_filter(text).expect("parses");
        assert_eq!(parse_filter(&filter.to_string()).expect("reparses"), filter);
    }

    #[test]
    fn test_parse_errors_report_position() {
        match parse_filter("Id == ") {
            Err(QueryError::Parse { position, .. }) => assert_eq!(position, 6),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(parse_filter("Id == 3 3").is_err());
        assert!(parse_filter("Id == #").is_err());
        assert!(parse_filter("Title.Length(3)").is_err());
        assert!(parse_filter("Id == Name").is_err());
        assert!(parse_filter("").is_err());
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let parens = format!("{}Id == 1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse_filter(&parens), Err(QueryError::Parse { .. })));

        let negations = format!("{}Id == 1", "!".repeat(10_000));
        assert!(matches!(parse_filter(&negations), Err(QueryError::Parse { .. })));

        let methods = format!(
            "{}'x'{}",
            "Title.Contains(".repeat(10_000),
            ")".repeat(10_000)
        );
        assert!(matches!(parse_filter(&methods), Err(QueryError::Parse { .. })));

        match parse_filter(&parens) {
            Err(QueryError::Parse { message, .. }) => {
                assert_eq!(message, "expression nested too deeply")
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_nesting_within_limit_parses() {
        let depth = MAX_NESTING_DEPTH - 1;
        let filter = format!("{}Id == 1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(parse_filter(&filter).is_ok());

        let negated = format!("{}Id == 1", "!".repeat(depth));
        assert!(parse_filter(&negated).is_ok());
    }

    #[test]
    fn test_parse_order_by() {
        let keys = parse_order_by("ReleaseDate desc, Title asc, Id").expect("parses");
        assert_eq!(
            keys,
            vec![
                SortKey::desc("ReleaseDate"),
                SortKey::asc("Title"),
                SortKey::asc("Id")
            ]
        );
        assert!(parse_order_by("Title sideways").is_err());
        assert!(parse_order_by("  ").expect("empty is allowed").is_empty());
    }

    #[test]
    fn test_parse_projection_forms() {
        let expected = Projection::of(["Title", "ReleaseDate"]);
        assert_eq!(parse_projection("new (Title, ReleaseDate)").expect("parses"), expected);
        assert_eq!(parse_projection("new { Title, ReleaseDate }").expect("parses"), expected);
        assert_eq!(parse_projection("Title, ReleaseDate").expect("parses"), expected);

        let aliased = parse_projection("new (Title as Name)").expect("parses");
        assert_eq!(aliased.columns[0].alias.as_deref(), Some("Name"));
        assert!(parse_projection("new (Title").is_err());
    }

    #[test]
    fn test_parse_includes() {
        assert_eq!(parse_includes(" Artist , ,Songs"), vec!["Artist", "Songs"]);
        assert!(parse_includes("").is_empty());
    }
}
