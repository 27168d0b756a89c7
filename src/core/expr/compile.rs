//! Validation of typed queries and translation to SQLite SQL
//!
//! Identifiers only ever come from the entity's allow-list (quoted with
//! their canonical names); every value is bound as a parameter.

use super::ast::{CompareOp, Filter, Operand, Projection, SortKey, TextOp};
use super::Query;
use crate::core::entity::{Entity, Navigation};
use crate::core::error::QueryError;
use crate::core::field::{FieldDef, FieldKind, FieldValue};

/// Quote an identifier for SQLite
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// SQL text plus the values bound to its placeholders, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub args: Vec<FieldValue>,
}

/// A selected column: the underlying field and the name it is returned under
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub field: FieldDef,
    pub alias: String,
}

/// A validated query, ready to run against one table
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub table: &'static str,
    pub filter: Option<SqlFragment>,
    pub order_by: Vec<(FieldDef, bool)>,
    pub columns: Vec<Column>,
    pub projected: bool,
    /// Include paths, each a chain of navigations from the queried entity
    pub includes: Vec<Vec<Navigation>>,
    pub skip: Option<i64>,
    pub top: Option<i64>,
}

impl QueryPlan {
    /// Validate `query` against `T`'s allow-list and navigations
    pub fn new<T: Entity>(query: &Query) -> Result<Self, QueryError> {
        let compiler = Compiler {
            entity: T::entity_name(),
            fields: T::fields(),
            parameters: &query.parameters,
        };

        let navigations = T::navigations();
        let includes = query
            .includes
            .iter()
            .map(|path| Navigation::resolve_path(T::entity_name(), &navigations, path))
            .collect::<Result<Vec<_>, _>>()?;

        let filter = query
            .filter
            .as_ref()
            .map(|f| compiler.filter(f))
            .transpose()?;

        let order_by = compiler.order_by(&query.order_by)?;

        let (columns, projected) = match &query.projection {
            Some(projection) => (compiler.projection(projection)?, true),
            None => (
                T::fields()
                    .iter()
                    .map(|f| Column {
                        field: *f,
                        alias: f.name.to_string(),
                    })
                    .collect(),
                false,
            ),
        };

        Ok(Self {
            table: T::table_name(),
            filter,
            order_by,
            columns,
            projected,
            includes,
            skip: query.skip,
            top: query.top,
        })
    }

    fn where_clause(&self, sql: &mut String, args: &mut Vec<FieldValue>) {
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.sql);
            args.extend(filter.args.iter().cloned());
        }
    }

    /// Count of rows matching the filter, before sorting and paging
    pub fn count_sql(&self) -> SqlFragment {
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote(self.table));
        let mut args = Vec::new();
        self.where_clause(&mut sql, &mut args);
        SqlFragment { sql, args }
    }

    /// The paged select
    pub fn select_sql(&self) -> SqlFragment {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                if c.alias == c.field.name {
                    quote(c.field.name)
                } else {
                    format!("{} AS {}", quote(c.field.name), quote(&c.alias))
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {} FROM {}", columns, quote(self.table));
        let mut args = Vec::new();
        self.where_clause(&mut sql, &mut args);

        sql.push_str(" ORDER BY ");
        let mut keys: Vec<String> = self
            .order_by
            .iter()
            .map(|(field, descending)| {
                format!(
                    "{}{}",
                    quote(field.name),
                    if *descending { " DESC" } else { "" }
                )
            })
            .collect();
        // Id keeps pages stable when sort keys tie
        if !self.order_by.iter().any(|(field, _)| field.name == "Id") {
            keys.push(quote("Id"));
        }
        sql.push_str(&keys.join(", "));

        match (self.skip.filter(|s| *s > 0), self.top.filter(|t| *t > 0)) {
            (None, None) => {}
            (skip, top) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                args.push(FieldValue::Integer(top.unwrap_or(-1)));
                args.push(FieldValue::Integer(skip.unwrap_or(0)));
            }
        }

        SqlFragment { sql, args }
    }
}

struct Compiler<'a> {
    entity: &'static str,
    fields: &'static [FieldDef],
    parameters: &'a [FieldValue],
}

impl Compiler<'_> {
    fn field(&self, name: &str) -> Result<FieldDef, QueryError> {
        FieldDef::resolve(self.fields, name)
            .copied()
            .ok_or_else(|| QueryError::UnknownField {
                entity_type: self.entity.to_string(),
                field: name.to_string(),
            })
    }

    fn value(&self, field: &FieldDef, operand: &Operand) -> Result<FieldValue, QueryError> {
        let raw = match operand {
            Operand::Value(value) => value,
            Operand::Parameter(index) => self
                .parameters
                .get(*index)
                .ok_or(QueryError::MissingParameter { index: *index })?,
        };
        raw.coerce(field.kind).ok_or_else(|| QueryError::TypeMismatch {
            field: field.name.to_string(),
            expected: format!("{:?}", field.kind).to_lowercase(),
            found: raw.type_name().to_string(),
        })
    }

    fn filter(&self, filter: &Filter) -> Result<SqlFragment, QueryError> {
        match filter {
            Filter::Compare { field, op, value } => {
                let def = self.field(field)?;
                let value = self.value(&def, value)?;
                if value.is_null() {
                    return match op {
                        CompareOp::Eq => Ok(is_null(&def, false)),
                        CompareOp::Ne => Ok(is_null(&def, true)),
                        _ => Err(QueryError::UnsupportedOperator {
                            field: def.name.to_string(),
                            operator: format!("{} null", op.as_str()),
                        }),
                    };
                }
                Ok(SqlFragment {
                    sql: format!("{} {} ?", quote(def.name), op.sql()),
                    args: vec![value],
                })
            }
            Filter::Text { field, op, value } => {
                let def = self.field(field)?;
                if def.kind != FieldKind::Text {
                    return Err(QueryError::UnsupportedOperator {
                        field: def.name.to_string(),
                        operator: op.as_str().to_string(),
                    });
                }
                let needle = match self.value(&def, value)? {
                    FieldValue::String(s) => escape_like(&s),
                    _ => {
                        return Err(QueryError::TypeMismatch {
                            field: def.name.to_string(),
                            expected: "string".to_string(),
                            found: "null".to_string(),
                        });
                    }
                };
                let pattern = match op {
                    TextOp::Contains => format!("%{}%", needle),
                    TextOp::StartsWith => format!("{}%", needle),
                    TextOp::EndsWith => format!("%{}", needle),
                };
                Ok(SqlFragment {
                    sql: format!("{} LIKE ? ESCAPE '\\'", quote(def.name)),
                    args: vec![FieldValue::String(pattern)],
                })
            }
            Filter::IsNull { field, negated } => Ok(is_null(&self.field(field)?, *negated)),
            Filter::And(parts) => self.join(parts, " AND ", "1 = 1"),
            Filter::Or(parts) => self.join(parts, " OR ", "1 = 0"),
            Filter::Not(inner) => {
                let inner = self.filter(inner)?;
                Ok(SqlFragment {
                    sql: format!("NOT ({})", inner.sql),
                    args: inner.args,
                })
            }
        }
    }

    fn join(&self, parts: &[Filter], joiner: &str, empty: &str) -> Result<SqlFragment, QueryError> {
        if parts.is_empty() {
            return Ok(SqlFragment {
                sql: empty.to_string(),
                args: Vec::new(),
            });
        }
        let mut sql = Vec::with_capacity(parts.len());
        let mut args = Vec::new();
        for part in parts {
            let fragment = self.filter(part)?;
            sql.push(format!("({})", fragment.sql));
            args.extend(fragment.args);
        }
        Ok(SqlFragment {
            sql: sql.join(joiner),
            args,
        })
    }

    fn order_by(&self, keys: &[SortKey]) -> Result<Vec<(FieldDef, bool)>, QueryError> {
        keys.iter()
            .map(|key| Ok((self.field(&key.field)?, key.descending)))
            .collect()
    }

    fn projection(&self, projection: &Projection) -> Result<Vec<Column>, QueryError> {
        projection
            .columns
            .iter()
            .map(|column| {
                let field = self.field(&column.field)?;
                Ok(Column {
                    field,
                    alias: column
                        .alias
                        .clone()
                        .unwrap_or_else(|| field.name.to_string()),
                })
            })
            .collect()
    }
}

fn is_null(def: &FieldDef, negated: bool) -> SqlFragment {
    SqlFragment {
        sql: format!(
            "{} IS {}NULL",
            quote(def.name),
            if negated { "NOT " } else { "" }
        ),
        args: Vec::new(),
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
