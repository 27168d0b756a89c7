//! Database contexts and the service that hands them out.
//!
//! A [`DbContext`] is one unit of work against one database: a pooled
//! connection in production, a connection inside a transaction that is never
//! committed, or a private in-memory database created and seeded on the spot.

use crate::config::AppConfig;
use crate::core::error::CrudResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Sqlite, SqliteConnection, Transaction};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use tokio::sync::{Mutex, MutexGuard};

/// How a context talks to its database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbContextType {
    /// Pooled connection to the configured database
    Production,
    /// Configured database, inside a transaction that is rolled back when the
    /// context is dropped
    OpenTransaction,
    /// Fresh in-memory database, created and seeded for this context only
    InMemory,
}

impl fmt::Display for DbContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbContextType::Production => write!(f, "Production"),
            DbContextType::OpenTransaction => write!(f, "OpenTransaction"),
            DbContextType::InMemory => write!(f, "InMemory"),
        }
    }
}

/// A database schema: its configuration name, tables and seed data
#[async_trait]
pub trait DbContextKind: Send + Sync + 'static {
    /// Key of the connection string under `db_contexts`
    fn name() -> &'static str;

    /// Create every table of the context (idempotent)
    async fn create_schema(conn: &mut SqliteConnection) -> CrudResult<()>;

    /// Insert reference rows (idempotent)
    async fn seed(_conn: &mut SqliteConnection) -> CrudResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DbContext
// ---------------------------------------------------------------------------

enum ContextConnection {
    Pooled(PoolConnection<Sqlite>),
    Transaction(Transaction<'static, Sqlite>),
    Detached(SqliteConnection),
}

/// One unit of work against the database of context `C`.
///
/// Operations on the same context are serialized.
pub struct DbContext<C> {
    context_type: DbContextType,
    connection: Mutex<ContextConnection>,
    _marker: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for DbContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("context_type", &self.context_type)
            .finish_non_exhaustive()
    }
}

impl<C> DbContext<C> {
    fn new(context_type: DbContextType, connection: ContextConnection) -> Self {
        Self {
            context_type,
            connection: Mutex::new(connection),
            _marker: PhantomData,
        }
    }

    pub fn context_type(&self) -> DbContextType {
        self.context_type
    }

    /// Exclusive access to the underlying connection
    pub async fn connection(&self) -> ConnectionGuard<'_> {
        ConnectionGuard(self.connection.lock().await)
    }

    /// Discard everything written through an `OpenTransaction` context.
    ///
    /// Dropping the context has the same effect; other modes have nothing to
    /// roll back.
    pub async fn rollback(self) -> CrudResult<()> {
        if let ContextConnection::Transaction(tx) = self.connection.into_inner() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// Locked connection of a [`DbContext`]
pub struct ConnectionGuard<'a>(MutexGuard<'a, ContextConnection>);

impl Deref for ConnectionGuard<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match &*self.0 {
            ContextConnection::Pooled(conn) => &**conn,
            ContextConnection::Transaction(tx) => &**tx,
            ContextConnection::Detached(conn) => conn,
        }
    }
}

impl DerefMut for ConnectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match &mut *self.0 {
            ContextConnection::Pooled(conn) => &mut **conn,
            ContextConnection::Transaction(tx) => &mut **tx,
            ContextConnection::Detached(conn) => conn,
        }
    }
}

// ---------------------------------------------------------------------------
// DbContextService
// ---------------------------------------------------------------------------

/// Hands out contexts of kind `C`, connected with the connection string
/// configured under `db_contexts.<C::name()>`
pub struct DbContextService<C> {
    pool: SqlitePool,
    _marker: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for DbContextService<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContextService").finish_non_exhaustive()
    }
}

impl<C: DbContextKind> DbContextService<C> {
    /// Fails with a configuration error when no connection string is
    /// configured for `C`. No connection is opened until a context is
    /// requested.
    pub fn new(config: &AppConfig) -> CrudResult<Self> {
        let connection_string = config.connection_string(C::name())?;
        let options = SqliteConnectOptions::from_str(connection_string)?.foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_lazy_with(options);

        tracing::debug!(context = C::name(), "db context service created");
        Ok(Self {
            pool,
            _marker: PhantomData,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A production context
    pub async fn get_db_context(&self) -> CrudResult<DbContext<C>> {
        let conn = self.pool.acquire().await?;
        Ok(DbContext::new(
            DbContextType::Production,
            ContextConnection::Pooled(conn),
        ))
    }

    /// A context of the requested type
    pub async fn get_test_db_context(
        &self,
        context_type: DbContextType,
    ) -> CrudResult<DbContext<C>> {
        match context_type {
            DbContextType::Production => self.get_db_context().await,
            DbContextType::OpenTransaction => {
                let tx = self.pool.begin().await?;
                tracing::debug!(context = C::name(), "opened test transaction");
                Ok(DbContext::new(
                    context_type,
                    ContextConnection::Transaction(tx),
                ))
            }
            DbContextType::InMemory => {
                let mut conn = SqliteConnectOptions::from_str("sqlite::memory:")?
                    .foreign_keys(true)
                    .connect()
                    .await?;
                C::create_schema(&mut conn).await?;
                C::seed(&mut conn).await?;
                tracing::debug!(context = C::name(), "created in-memory database");
                Ok(DbContext::new(
                    context_type,
                    ContextConnection::Detached(conn),
                ))
            }
        }
    }

    /// Create the schema and seed data in the configured database
    pub async fn ensure_created(&self) -> CrudResult<()> {
        let mut conn = self.pool.acquire().await?;
        C::create_schema(&mut conn).await?;
        C::seed(&mut conn).await?;
        tracing::info!(context = C::name(), "database ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ConfigError, CrudError};
    use crate::hits::HitsContext;

    async fn song_count(ctx: &DbContext<HitsContext>) -> i64 {
        let mut conn = ctx.connection().await;
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM \"Song\"")
            .fetch_one(&mut *conn)
            .await
            .expect("count")
    }

    #[test]
    fn test_missing_connection_string_fails_at_construction() {
        let result = DbContextService::<HitsContext>::new(&AppConfig::default());
        assert!(matches!(
            result,
            Err(CrudError::Config(ConfigError::MissingField { .. }))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_contexts_are_isolated() {
        let config = AppConfig::default().with_db_context("HitsContext", "sqlite::memory:");
        let service = DbContextService::<HitsContext>::new(&config).expect("configured");

        let first = service
            .get_test_db_context(DbContextType::InMemory)
            .await
            .expect("context");
        let second = service
            .get_test_db_context(DbContextType::InMemory)
            .await
            .expect("context");
        assert_eq!(first.context_type(), DbContextType::InMemory);

        {
            let mut conn = first.connection().await;
            sqlx::query("DELETE FROM \"Song\"")
                .execute(&mut *conn)
                .await
                .expect("delete");
        }

        assert_eq!(song_count(&first).await, 0);
        assert!(song_count(&second).await > 0);
    }

    #[tokio::test]
    async fn test_open_transaction_is_rolled_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("hits.db").display()
        );
        let config = AppConfig::default().with_db_context("HitsContext", &url);
        let service = DbContextService::<HitsContext>::new(&config).expect("configured");
        service.ensure_created().await.expect("schema");

        let ctx = service
            .get_test_db_context(DbContextType::OpenTransaction)
            .await
            .expect("context");
        {
            let mut conn = ctx.connection().await;
            sqlx::query("DELETE FROM \"Song\"")
                .execute(&mut *conn)
                .await
                .expect("delete");
        }
        ctx.rollback().await.expect("rollback");

        let production = service.get_db_context().await.expect("context");
        let mut conn = production.connection().await;
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM \"Song\"")
            .fetch_one(&mut *conn)
            .await
            .expect("count");
        assert!(remaining > 0);
    }
}
