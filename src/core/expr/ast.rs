//! Typed query expressions
//!
//! Filters, sort keys and projections are plain data. They can be built
//! directly with the builder methods or parsed from expression strings,
//! and are validated against an entity's field allow-list before any SQL
//! is produced.

use crate::core::field::FieldValue;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use uuid::Uuid;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// The operator with its operands swapped (`5 < Id` is `Id > 5`)
    pub fn flipped(&self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }
}

/// String matching operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

impl TextOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextOp::Contains => "Contains",
            TextOp::StartsWith => "StartsWith",
            TextOp::EndsWith => "EndsWith",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "contains" => Some(TextOp::Contains),
            "startswith" => Some(TextOp::StartsWith),
            "endswith" => Some(TextOp::EndsWith),
            _ => None,
        }
    }
}

/// Right-hand side of a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// An inline value
    Value(FieldValue),
    /// A positional parameter, `@N`
    Parameter(usize),
}

impl Operand {
    pub fn param(index: usize) -> Self {
        Operand::Parameter(index)
    }
}

macro_rules! operand_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Value(FieldValue::from(value))
                }
            }
        )*
    };
}

operand_from!(i64, i32, f64, bool, Uuid, DateTime<Utc>, NaiveDate, String, &str);

impl From<FieldValue> for Operand {
    fn from(value: FieldValue) -> Self {
        Operand::Value(value)
    }
}

/// A boolean predicate over one entity's fields
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        value: Operand,
    },
    Text {
        field: String,
        op: TextOp,
        value: Operand,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Start a predicate on a field
    pub fn field(name: impl Into<String>) -> FieldRef {
        FieldRef(name.into())
    }

    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(_) | Filter::Or(_) => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

/// Builder handle for a predicate on one field
#[derive(Debug, Clone)]
pub struct FieldRef(String);

impl FieldRef {
    fn compare(self, op: CompareOp, value: impl Into<Operand>) -> Filter {
        Filter::Compare {
            field: self.0,
            op,
            value: value.into(),
        }
    }

    fn text(self, op: TextOp, value: impl Into<Operand>) -> Filter {
        Filter::Text {
            field: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Operand>) -> Filter {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Operand>) -> Filter {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Operand>) -> Filter {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Operand>) -> Filter {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Operand>) -> Filter {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Operand>) -> Filter {
        self.compare(CompareOp::Ge, value)
    }

    pub fn contains(self, value: impl Into<Operand>) -> Filter {
        self.text(TextOp::Contains, value)
    }

    pub fn starts_with(self, value: impl Into<Operand>) -> Filter {
        self.text(TextOp::StartsWith, value)
    }

    pub fn ends_with(self, value: impl Into<Operand>) -> Filter {
        self.text(TextOp::EndsWith, value)
    }

    pub fn is_null(self) -> Filter {
        Filter::IsNull {
            field: self.0,
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Filter {
        Filter::IsNull {
            field: self.0,
            negated: true,
        }
    }
}

fn fmt_operand(operand: &Operand, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match operand {
        Operand::Parameter(index) => write!(f, "@{}", index),
        Operand::Value(FieldValue::Null) => write!(f, "null"),
        Operand::Value(FieldValue::Integer(i)) => write!(f, "{}", i),
        Operand::Value(FieldValue::Float(v)) => write!(f, "{:?}", v),
        Operand::Value(FieldValue::Boolean(b)) => write!(f, "{}", b),
        Operand::Value(other) => {
            let text = other.to_string().replace('\\', "\\\\").replace('"', "\\\"");
            write!(f, "\"{}\"", text)
        }
    }
}

/// Renders the filter in the expression language; the output parses back
/// to an equal filter.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare { field, op, value } => {
                write!(f, "{} {} ", field, op.as_str())?;
                fmt_operand(value, f)
            }
            Filter::Text { field, op, value } => {
                write!(f, "{}.{}(", field, op.as_str())?;
                fmt_operand(value, f)?;
                write!(f, ")")
            }
            Filter::IsNull { field, negated } => {
                let op = if *negated { "!=" } else { "==" };
                write!(f, "{} {} null", field, op)
            }
            Filter::And(parts) | Filter::Or(parts) => {
                let joiner = if matches!(self, Filter::And(_)) {
                    " && "
                } else {
                    " || "
                };
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    part.fmt_nested(f)?;
                }
                Ok(())
            }
            Filter::Not(inner) => {
                write!(f, "!")?;
                match inner.as_ref() {
                    Filter::And(_) | Filter::Or(_) => inner.fmt_nested(f),
                    other => write!(f, "({})", other),
                }
            }
        }
    }
}

/// One key of a multi-key sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} desc", self.field)
        } else {
            write!(f, "{}", self.field)
        }
    }
}

/// A column subset, optionally renamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub columns: Vec<ProjectedColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub field: String,
    pub alias: Option<String>,
}

impl Projection {
    pub fn of<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: fields
                .into_iter()
                .map(|field| ProjectedColumn {
                    field: field.into(),
                    alias: None,
                })
                .collect(),
        }
    }

    /// Add a renamed column
    pub fn with_alias(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.columns.push(ProjectedColumn {
            field: field.into(),
            alias: Some(alias.into()),
        });
        self
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "new (")?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &column.alias {
                Some(alias) => write!(f, "{} as {}", column.field, alias)?,
                None => write!(f, "{}", column.field)?,
            }
        }
        write!(f, ")")
    }
}
