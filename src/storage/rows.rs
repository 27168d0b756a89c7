//! Reading and writing entity rows.
//!
//! Rows travel as JSON objects keyed by column name: a fetched row is decoded
//! column by column into [`FieldValue`]s, and an entity being written is
//! serialized and its allow-listed fields picked out again.

use crate::core::entity::{Entity, Navigation, NavigationKind};
use crate::core::error::{CrudError, CrudResult, EntityError};
use crate::core::expr::compile::{Column, QueryPlan, SqlFragment, quote};
use crate::core::field::{FieldDef, FieldKind, FieldValue};
use chrono::{NaiveDate, NaiveDateTime};
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, Row, SqliteConnection};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Largest number of values bound in one `IN (...)` list
const IN_CHUNK: usize = 500;

// ---------------------------------------------------------------------------
// Binding and decoding
// ---------------------------------------------------------------------------

/// Bind `values` in order
pub fn arguments(values: &[FieldValue]) -> CrudResult<SqliteArguments<'static>> {
    let mut args = SqliteArguments::default();
    for value in values {
        let added = match value {
            FieldValue::Integer(i) => args.add(*i),
            FieldValue::Float(f) => args.add(*f),
            FieldValue::Boolean(b) => args.add(*b),
            FieldValue::Uuid(u) => args.add(u.hyphenated().to_string()),
            FieldValue::DateTime(dt) => args.add(dt.naive_utc()),
            FieldValue::Date(d) => args.add(*d),
            FieldValue::String(s) => args.add(s.clone()),
            FieldValue::Null => args.add(None::<String>),
        };
        added.map_err(|e| CrudError::Internal(format!("failed to bind value: {}", e)))?;
    }
    Ok(args)
}

fn decode(row: &SqliteRow, name: &str, kind: FieldKind) -> CrudResult<FieldValue> {
    let value = match kind {
        FieldKind::Integer => row.try_get::<Option<i64>, _>(name)?.map(FieldValue::Integer),
        FieldKind::Float => row.try_get::<Option<f64>, _>(name)?.map(FieldValue::Float),
        FieldKind::Text => row.try_get::<Option<String>, _>(name)?.map(FieldValue::String),
        FieldKind::Boolean => row.try_get::<Option<bool>, _>(name)?.map(FieldValue::Boolean),
        FieldKind::Uuid => match row.try_get::<Option<String>, _>(name)? {
            Some(text) => Some(FieldValue::Uuid(Uuid::parse_str(&text).map_err(|e| {
                CrudError::Internal(format!("column {} holds an invalid uuid: {}", name, e))
            })?)),
            None => None,
        },
        FieldKind::DateTime => row
            .try_get::<Option<NaiveDateTime>, _>(name)?
            .map(|dt| FieldValue::DateTime(dt.and_utc())),
        FieldKind::Date => row.try_get::<Option<NaiveDate>, _>(name)?.map(FieldValue::Date),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

/// Decode the selected columns of a row into a JSON object
pub fn row_to_json(row: &SqliteRow, columns: &[Column]) -> CrudResult<Map<String, Value>> {
    let mut object = Map::with_capacity(columns.len());
    for column in columns {
        let value = decode(row, &column.alias, column.field.kind)?;
        object.insert(column.alias.clone(), value.to_json());
    }
    Ok(object)
}

fn all_columns(fields: &[FieldDef]) -> Vec<Column> {
    fields
        .iter()
        .map(|f| Column {
            field: *f,
            alias: f.name.to_string(),
        })
        .collect()
}

/// Deserialize fetched rows into entities
pub fn into_entities<T: Entity>(rows: Vec<Map<String, Value>>) -> CrudResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|e| {
                EntityError::SerializationError {
                    entity_type: T::entity_name().to_string(),
                    message: e.to_string(),
                }
                .into()
            })
        })
        .collect()
}

/// The allow-listed field values of an entity, in field order
pub fn entity_values<T: Entity>(entity: &T) -> CrudResult<Vec<(FieldDef, FieldValue)>> {
    let serialization_error = |message: String| -> CrudError {
        EntityError::SerializationError {
            entity_type: T::entity_name().to_string(),
            message,
        }
        .into()
    };

    let json = serde_json::to_value(entity).map_err(|e| serialization_error(e.to_string()))?;
    let object = json
        .as_object()
        .ok_or_else(|| serialization_error("entity is not serialized as an object".into()))?;

    T::fields()
        .iter()
        .map(|field| {
            let raw = object.get(field.name).unwrap_or(&Value::Null);
            FieldValue::from_json(raw, field.kind)
                .map(|value| (*field, value))
                .ok_or_else(|| {
                    serialization_error(format!(
                        "field {} cannot be stored as {}",
                        field.name,
                        field.kind.sql_type()
                    ))
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Run a select and decode each row against `columns`
pub async fn fetch_json(
    conn: &mut SqliteConnection,
    fragment: &SqlFragment,
    columns: &[Column],
) -> CrudResult<Vec<Map<String, Value>>> {
    let mut stream = sqlx::query_with(&fragment.sql, arguments(&fragment.args)?).fetch(&mut *conn);
    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(row_to_json(&row, columns)?);
    }
    Ok(rows)
}

/// Run the select of a plan, eager-loading its includes unless it projects
pub async fn fetch_plan(
    conn: &mut SqliteConnection,
    plan: &QueryPlan,
) -> CrudResult<Vec<Map<String, Value>>> {
    let mut rows = fetch_json(conn, &plan.select_sql(), &plan.columns).await?;
    if !plan.projected {
        for path in &plan.includes {
            load_include(conn, &mut rows, path).await?;
        }
    }
    Ok(rows)
}

/// Count the rows matching a plan's filter
pub async fn count_plan(conn: &mut SqliteConnection, plan: &QueryPlan) -> CrudResult<i64> {
    let fragment = plan.count_sql();
    let count: i64 = sqlx::query_scalar_with(&fragment.sql, arguments(&fragment.args)?)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Load one entity by id
pub async fn find<T: Entity>(conn: &mut SqliteConnection, id: i64) -> CrudResult<Option<T>> {
    let fragment = SqlFragment {
        sql: format!(
            "SELECT {} FROM {} WHERE \"Id\" = ?",
            column_list(T::fields()),
            quote(T::table_name())
        ),
        args: vec![FieldValue::Integer(id)],
    };
    let rows = fetch_json(conn, &fragment, &all_columns(T::fields())).await?;
    Ok(into_entities::<T>(rows)?.into_iter().next())
}

/// Rows whose `SysStart` is strictly after `after`, ordered by id
pub async fn modified_since<T: Entity>(
    conn: &mut SqliteConnection,
    after: NaiveDateTime,
) -> CrudResult<Vec<T>> {
    let fragment = SqlFragment {
        sql: format!(
            "SELECT {} FROM {} WHERE \"SysStart\" > ? ORDER BY \"Id\"",
            column_list(T::fields()),
            quote(T::table_name())
        ),
        args: vec![FieldValue::DateTime(after.and_utc())],
    };
    let rows = fetch_json(conn, &fragment, &all_columns(T::fields())).await?;
    into_entities(rows)
}

/// Latest `SysStart` of the table, `None` when it is empty
pub async fn max_sys_start<T: Entity>(
    conn: &mut SqliteConnection,
) -> CrudResult<Option<NaiveDateTime>> {
    let sql = format!("SELECT MAX(\"SysStart\") FROM {}", quote(T::table_name()));
    let latest: Option<NaiveDateTime> = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
    Ok(latest)
}

fn column_list(fields: &[FieldDef]) -> String {
    fields
        .iter()
        .map(|f| quote(f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load an include path level by level: each navigation is attached to the
/// rows the previous one loaded
pub async fn load_include(
    conn: &mut SqliteConnection,
    rows: &mut [Map<String, Value>],
    path: &[Navigation],
) -> CrudResult<()> {
    let mut level: Vec<&mut Map<String, Value>> = rows.iter_mut().collect();
    for navigation in path {
        load_navigation(conn, &mut level, navigation).await?;
        level = loaded_rows(level, navigation.name);
    }
    Ok(())
}

/// The rows a navigation attached to `parents`
fn loaded_rows<'a>(
    parents: Vec<&'a mut Map<String, Value>>,
    name: &str,
) -> Vec<&'a mut Map<String, Value>> {
    let mut loaded = Vec::new();
    for parent in parents {
        match parent.get_mut(name) {
            Some(Value::Object(row)) => loaded.push(row),
            Some(Value::Array(items)) => {
                loaded.extend(items.iter_mut().filter_map(Value::as_object_mut))
            }
            _ => {}
        }
    }
    loaded
}

/// Attach a navigation to every parent row under the navigation's name.
///
/// Reference navigations become an object or `null`, collections an array
/// ordered by the target's id.
pub async fn load_navigation(
    conn: &mut SqliteConnection,
    parents: &mut [&mut Map<String, Value>],
    navigation: &Navigation,
) -> CrudResult<()> {
    if parents.is_empty() {
        return Ok(());
    }

    let (parent_key, target_key) = match navigation.kind {
        NavigationKind::One => (navigation.foreign_key, "Id"),
        NavigationKind::Many => ("Id", navigation.foreign_key),
    };

    let keys: BTreeSet<i64> = parents
        .iter()
        .filter_map(|row| row.get(parent_key).and_then(Value::as_i64))
        .collect();
    let keys: Vec<i64> = keys.into_iter().collect();

    let columns = all_columns(navigation.target_fields);
    let mut targets: HashMap<i64, Vec<Value>> = HashMap::new();
    for chunk in keys.chunks(IN_CHUNK) {
        let fragment = SqlFragment {
            sql: format!(
                "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY \"Id\"",
                column_list(navigation.target_fields),
                quote(navigation.target_table),
                quote(target_key),
                vec!["?"; chunk.len()].join(", ")
            ),
            args: chunk.iter().map(|k| FieldValue::Integer(*k)).collect(),
        };
        for row in fetch_json(conn, &fragment, &columns).await? {
            if let Some(key) = row.get(target_key).and_then(Value::as_i64) {
                targets.entry(key).or_default().push(Value::Object(row));
            }
        }
    }

    for parent in parents.iter_mut() {
        let key = parent.get(parent_key).and_then(Value::as_i64);
        let related = key.and_then(|k| targets.get(&k));
        let value = match navigation.kind {
            NavigationKind::One => related
                .and_then(|rows| rows.first().cloned())
                .unwrap_or(Value::Null),
            NavigationKind::Many => Value::Array(related.cloned().unwrap_or_default()),
        };
        parent.insert(navigation.name.to_string(), value);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// How an insert treats an existing row with the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Fail,
    Ignore,
}

/// Insert an entity, returning its id.
///
/// An id of zero is left to the store to assign.
pub async fn insert<T: Entity>(
    conn: &mut SqliteConnection,
    entity: &T,
    on_conflict: OnConflict,
) -> CrudResult<i64> {
    let values: Vec<(FieldDef, FieldValue)> = entity_values(entity)?
        .into_iter()
        .filter(|(field, _)| field.name != "Id" || entity.id() != 0)
        .collect();

    let sql = format!(
        "INSERT{} INTO {} ({}) VALUES ({})",
        match on_conflict {
            OnConflict::Fail => "",
            OnConflict::Ignore => " OR IGNORE",
        },
        quote(T::table_name()),
        values
            .iter()
            .map(|(f, _)| quote(f.name))
            .collect::<Vec<_>>()
            .join(", "),
        vec!["?"; values.len()].join(", ")
    );
    let args: Vec<FieldValue> = values.into_iter().map(|(_, v)| v).collect();

    let result = sqlx::query_with(&sql, arguments(&args)?)
        .execute(&mut *conn)
        .await?;

    Ok(match entity.id() {
        0 => result.last_insert_rowid(),
        id => id,
    })
}

/// Insert rows with fixed ids, skipping those already present
pub async fn seed<T: Entity>(conn: &mut SqliteConnection, entities: &[T]) -> CrudResult<()> {
    for entity in entities {
        insert(conn, entity, OnConflict::Ignore).await?;
    }
    tracing::debug!(table = T::table_name(), rows = entities.len(), "seeded");
    Ok(())
}

/// Overwrite every column of the row with the entity's id
pub async fn update<T: Entity>(conn: &mut SqliteConnection, entity: &T) -> CrudResult<u64> {
    let values: Vec<(FieldDef, FieldValue)> = entity_values(entity)?
        .into_iter()
        .filter(|(field, _)| field.name != "Id")
        .collect();

    let sql = format!(
        "UPDATE {} SET {} WHERE \"Id\" = ?",
        quote(T::table_name()),
        values
            .iter()
            .map(|(f, _)| format!("{} = ?", quote(f.name)))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut args: Vec<FieldValue> = values.into_iter().map(|(_, v)| v).collect();
    args.push(FieldValue::Integer(entity.id()));

    let result = sqlx::query_with(&sql, arguments(&args)?)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Record `user` as the last writer of a row
pub async fn stamp_sys_user<T: Entity>(
    conn: &mut SqliteConnection,
    id: i64,
    user: Option<&str>,
) -> CrudResult<u64> {
    let sql = format!(
        "UPDATE {} SET \"SysUser\" = ? WHERE \"Id\" = ?",
        quote(T::table_name())
    );
    let result = sqlx::query(&sql)
        .bind(user)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete<T: Entity>(conn: &mut SqliteConnection, id: i64) -> CrudResult<u64> {
    let sql = format!("DELETE FROM {} WHERE \"Id\" = ?", quote(T::table_name()));
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
