//! Query expressions: typed AST, string parser and SQL compiler
//!
//! A [`Query`] is the validated-before-execution form of [`QueryArgs`]. It
//! can be built directly:
//!
//! ```rust,ignore
//! let query = Query::new()
//!     .filter(Filter::field("Title").contains(Operand::param(0)))
//!     .parameters(vec!["Love".into()])
//!     .order_by(vec![SortKey::desc("ReleaseDate")])
//!     .top(10);
//! ```
//!
//! or parsed from the string form with [`Query::parse`].

pub mod ast;
pub mod compile;
pub mod parser;

pub use ast::{CompareOp, FieldRef, Filter, Operand, ProjectedColumn, Projection, SortKey, TextOp};
pub use compile::{Column, QueryPlan, SqlFragment};
pub use parser::{parse_filter, parse_includes, parse_order_by, parse_projection};

use crate::core::error::QueryError;
use crate::core::field::FieldValue;
use crate::core::query::QueryArgs;

/// Typed query over one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub parameters: Vec<FieldValue>,
    pub order_by: Vec<SortKey>,
    pub skip: Option<i64>,
    pub top: Option<i64>,
    pub projection: Option<Projection>,
    pub includes: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the string fields of `args`
    pub fn parse(args: &QueryArgs) -> Result<Self, QueryError> {
        let filter = match args.filter.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(parse_filter(text)?),
            _ => None,
        };

        let order_by = match args.order_by.as_deref() {
            Some(text) => parse_order_by(text)?,
            None => Vec::new(),
        };

        let projection = match args.select.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(parse_projection(text)?),
            _ => None,
        };

        Ok(Self {
            filter,
            parameters: args.filter_parameters.clone().unwrap_or_default(),
            order_by,
            skip: args.skip,
            top: args.top,
            projection,
            includes: args.expand.as_deref().map(parse_includes).unwrap_or_default(),
        })
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn parameters(mut self, parameters: Vec<FieldValue>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn order_by(mut self, keys: Vec<SortKey>) -> Self {
        self.order_by = keys;
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn top(mut self, top: i64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn include(mut self, navigation: impl Into<String>) -> Self {
        self.includes.push(navigation.into());
        self
    }

    /// Canonical filter text, used to key cached counts
    pub fn filter_text(&self) -> Option<String> {
        self.filter.as_ref().map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_args() {
        let args = QueryArgs::new()
            .filter("Title.Contains(@0)")
            .parameters(vec![FieldValue::from("Love")])
            .order_by("ReleaseDate desc")
            .select("new (Title)")
            .expand("Artist")
            .skip(5)
            .top(5);
        let query = Query::parse(&args).expect("parses");
        assert_eq!(
            query.filter,
            Some(Filter::field("Title").contains(Operand::param(0)))
        );
        assert_eq!(query.order_by, vec![SortKey::desc("ReleaseDate")]);
        assert_eq!(query.includes, vec!["Artist"]);
        assert_eq!(query.projection, Some(Projection::of(["Title"])));
        assert_eq!(query.skip, Some(5));
    }

    #[test]
    fn test_blank_filter_is_no_filter() {
        let query = Query::parse(&QueryArgs::new().filter("   ")).expect("parses");
        assert!(query.filter.is_none());
        assert!(query.filter_text().is_none());
    }

    #[test]
    fn test_malformed_args_fail_before_execution() {
        assert!(Query::parse(&QueryArgs::new().filter("Title ==")).is_err());
        assert!(Query::parse(&QueryArgs::new().order_by("Title up")).is_err());
        assert!(Query::parse(&QueryArgs::new().select("new (")).is_err());
    }
}
