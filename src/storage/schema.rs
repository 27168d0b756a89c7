//! Table creation for entities, including SQLite emulation of system-versioned
//! temporal tables.
//!
//! A temporal table gets two period columns (`SysStart`, `SysEnd`), a
//! `<table>_history` table with the same columns, and triggers that archive
//! the previous row version on every update and delete. `SysStart` is
//! refreshed on every update, so rows changed after an instant can be found
//! by comparing against it.

use crate::core::entity::{Entity, NavigationKind};
use crate::core::error::CrudResult;
use crate::core::expr::compile::quote;
use sqlx::SqliteConnection;

/// Current UTC time with millisecond precision, as stored in period columns
pub const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

/// `SysEnd` of the current row version
pub const PERIOD_END_MAX: &str = "'9999-12-31 23:59:59.999'";

/// Name of the history table backing `table`
pub fn history_table(table: &str) -> String {
    format!("{}_history", table)
}

// ---------------------------------------------------------------------------
// DDL generation
// ---------------------------------------------------------------------------

/// `CREATE TABLE` and companion statements for `T`, in execution order
pub fn create_statements<T: Entity>() -> Vec<String> {
    let table = T::table_name();
    let mut columns: Vec<String> = T::fields()
        .iter()
        .map(|field| {
            if field.name == "Id" {
                format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(field.name))
            } else {
                format!(
                    "{} {}{}",
                    quote(field.name),
                    field.kind.sql_type(),
                    if field.nullable { "" } else { " NOT NULL" }
                )
            }
        })
        .collect();

    if T::is_temporal() {
        columns.push(format!(
            "{} DATETIME NOT NULL DEFAULT ({})",
            quote("SysStart"),
            NOW
        ));
        columns.push(format!(
            "{} DATETIME NOT NULL DEFAULT {}",
            quote("SysEnd"),
            PERIOD_END_MAX
        ));
    }

    for navigation in T::navigations() {
        if navigation.kind == NavigationKind::One {
            columns.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quote(navigation.foreign_key),
                quote(navigation.target_table),
                quote("Id")
            ));
        }
    }

    let mut statements = vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(table),
            columns.join(", ")
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            quote(&format!("IX_{}_SysGuid", table)),
            quote(table),
            quote("SysGuid")
        ),
    ];

    if T::is_temporal() {
        statements.extend(temporal_statements::<T>());
    }
    statements
}

fn temporal_statements<T: Entity>() -> Vec<String> {
    let table = T::table_name();
    let history = history_table(table);

    let history_columns: Vec<String> = T::fields()
        .iter()
        .map(|f| format!("{} {}", quote(f.name), f.kind.sql_type()))
        .chain([
            format!("{} DATETIME NOT NULL", quote("SysStart")),
            format!("{} DATETIME NOT NULL", quote("SysEnd")),
        ])
        .collect();

    let names: Vec<String> = T::fields().iter().map(|f| quote(f.name)).collect();
    let old_values: Vec<String> = T::fields()
        .iter()
        .map(|f| format!("OLD.{}", quote(f.name)))
        .collect();
    let archive = format!(
        "INSERT INTO {} ({}, \"SysStart\", \"SysEnd\") VALUES ({}, OLD.\"SysStart\", {});",
        quote(&history),
        names.join(", "),
        old_values.join(", "),
        NOW
    );

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&history),
            history_columns.join(", ")
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (\"SysEnd\", \"SysStart\")",
            quote(&format!("IX_{}_period", history)),
            quote(&history)
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER UPDATE ON {} FOR EACH ROW BEGIN {} \
             UPDATE {} SET \"SysStart\" = {} WHERE \"Id\" = NEW.\"Id\"; END",
            quote(&format!("{}_versioning_update", table)),
            quote(table),
            archive,
            quote(table),
            NOW
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER DELETE ON {} FOR EACH ROW BEGIN {} END",
            quote(&format!("{}_versioning_delete", table)),
            quote(table),
            archive
        ),
    ]
}

/// Create the table for `T` if it does not exist (idempotent)
pub async fn ensure_table<T: Entity>(conn: &mut SqliteConnection) -> CrudResult<()> {
    for statement in create_statements::<T>() {
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    tracing::debug!(table = T::table_name(), "table ensured");
    Ok(())
}
