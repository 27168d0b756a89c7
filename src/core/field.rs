//! Field value types and the per-entity field allow-list

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// A polymorphic field value that can hold different types
///
/// Used both for filter parameters supplied by callers and for column values
/// read from or written to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    String(String),
    Null,
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a UUID if possible
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Short name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Uuid(_) => "uuid",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Date(_) => "date",
            FieldValue::String(_) => "string",
            FieldValue::Null => "null",
        }
    }

    /// Coerce this value to the storage type of a field.
    ///
    /// Strings are parsed into the target kind (`"1970-01-01"` becomes a
    /// date for a date column), integers widen to floats. Returns `None`
    /// when the value cannot represent the kind.
    pub fn coerce(&self, kind: FieldKind) -> Option<FieldValue> {
        use FieldKind as K;
        use FieldValue as V;

        match (self, kind) {
            (V::Null, _) => Some(V::Null),
            (V::Integer(i), K::Integer) => Some(V::Integer(*i)),
            (V::Integer(i), K::Float) => Some(V::Float(*i as f64)),
            (V::Integer(i), K::Boolean) if *i == 0 || *i == 1 => Some(V::Boolean(*i == 1)),
            (V::Float(f), K::Float) => Some(V::Float(*f)),
            (V::Float(f), K::Integer) if f.fract() == 0.0 => Some(V::Integer(*f as i64)),
            (V::Boolean(b), K::Boolean) => Some(V::Boolean(*b)),
            (V::Uuid(u), K::Uuid) => Some(V::Uuid(*u)),
            (V::Uuid(u), K::Text) => Some(V::String(u.to_string())),
            (V::DateTime(d), K::DateTime) => Some(V::DateTime(*d)),
            (V::DateTime(d), K::Date) => Some(V::Date(d.date_naive())),
            (V::Date(d), K::Date) => Some(V::Date(*d)),
            (V::Date(d), K::DateTime) => d.and_hms_opt(0, 0, 0).map(|dt| V::DateTime(dt.and_utc())),
            (V::String(s), K::Text) => Some(V::String(s.clone())),
            (V::String(s), kind) => Self::parse_as(s, kind),
            _ => None,
        }
    }

    fn parse_as(s: &str, kind: FieldKind) -> Option<FieldValue> {
        match kind {
            FieldKind::Integer => s.trim().parse().ok().map(FieldValue::Integer),
            FieldKind::Float => s.trim().parse().ok().map(FieldValue::Float),
            FieldKind::Boolean => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(FieldValue::Boolean(true)),
                "false" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            FieldKind::Uuid => Uuid::parse_str(s.trim()).ok().map(FieldValue::Uuid),
            FieldKind::DateTime => parse_datetime(s.trim()).map(FieldValue::DateTime),
            FieldKind::Date => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(FieldValue::Date),
            FieldKind::Text => Some(FieldValue::String(s.to_string())),
        }
    }

    /// Read a JSON value as a field of the given kind
    pub fn from_json(value: &Value, kind: FieldKind) -> Option<FieldValue> {
        let raw = match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64()?),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => return None,
        };
        raw.coerce(kind)
    }

    /// Convert into a JSON value
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Uuid(u) => write!(f, "{}", u),
            FieldValue::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value.into())
                }
            }
        )*
    };
}

field_value_from!(
    i64 => Integer,
    i32 => Integer,
    f64 => Float,
    bool => Boolean,
    Uuid => Uuid,
    DateTime<Utc> => DateTime,
    NaiveDate => Date,
    String => String,
    &str => String,
);

/// Storage type of an entity column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    Boolean,
    Uuid,
    DateTime,
    Date,
}

impl FieldKind {
    /// SQLite column type used when creating tables
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Integer => "INTEGER",
            FieldKind::Float => "REAL",
            FieldKind::Text | FieldKind::Uuid => "TEXT",
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::DateTime => "DATETIME",
            FieldKind::Date => "DATE",
        }
    }
}

/// One allow-listed, queryable column of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Canonical column name (also the JSON property name)
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }

    /// Resolve a caller-supplied name against an allow-list, ignoring case
    pub fn resolve<'a>(fields: &'a [FieldDef], name: &str) -> Option<&'a FieldDef> {
        fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_string() {
        let value = FieldValue::String("test".to_string());
        assert_eq!(value.as_string(), Some("test"));
        assert_eq!(value.as_integer(), None);
        assert!(!value.is_null());
    }

    #[test]
    fn test_field_value_null() {
        let value = FieldValue::Null;
        assert!(value.is_null());
        assert_eq!(value.to_string(), "null");
    }

    #[test]
    fn test_coerce_string_to_date() {
        let value = FieldValue::String("1970-01-01".to_string());
        assert_eq!(
            value.coerce(FieldKind::Date),
            Some(FieldValue::Date(
                NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid date")
            ))
        );
    }

    #[test]
    fn test_coerce_rejects_mismatch() {
        assert_eq!(FieldValue::Boolean(true).coerce(FieldKind::Date), None);
        assert_eq!(
            FieldValue::String("abc".to_string()).coerce(FieldKind::Integer),
            None
        );
        assert_eq!(FieldValue::Float(1.5).coerce(FieldKind::Integer), None);
    }

    #[test]
    fn test_coerce_integer_widening() {
        assert_eq!(
            FieldValue::Integer(3).coerce(FieldKind::Float),
            Some(FieldValue::Float(3.0))
        );
        assert_eq!(
            FieldValue::Integer(1).coerce(FieldKind::Boolean),
            Some(FieldValue::Boolean(true))
        );
    }

    #[test]
    fn test_untagged_deserialization() {
        let values: Vec<FieldValue> =
            serde_json::from_str(r#"[1, 2.5, true, "x", null]"#).expect("valid json");
        assert_eq!(
            values,
            vec![
                FieldValue::Integer(1),
                FieldValue::Float(2.5),
                FieldValue::Boolean(true),
                FieldValue::String("x".to_string()),
                FieldValue::Null,
            ]
        );
    }

    #[test]
    fn test_from_json_with_kind() {
        let guid = Uuid::new_v4();
        let json = Value::String(guid.to_string());
        assert_eq!(
            FieldValue::from_json(&json, FieldKind::Uuid),
            Some(FieldValue::Uuid(guid))
        );
        assert_eq!(FieldValue::from_json(&serde_json::json!([1]), FieldKind::Text), None);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        const FIELDS: &[FieldDef] = &[
            FieldDef::new("Id", FieldKind::Integer),
            FieldDef::new("UserName", FieldKind::Text),
        ];
        let def = FieldDef::resolve(FIELDS, "username").expect("field resolves");
        assert_eq!(def.name, "UserName");
        assert!(FieldDef::resolve(FIELDS, "Password").is_none());
    }
}
