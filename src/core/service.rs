//! Generic CRUD service over one entity type and one database context
//!
//! A service is built per request from [`CrudServiceDependencies`]. It owns
//! its [`DbContext`], stamps the requesting user's name on every write, and
//! answers paged queries whose total counts go through the shared
//! [`CountCache`].

use crate::core::count_cache::CountCache;
use crate::core::entity::Entity;
use crate::core::error::{CrudError, CrudResult};
use crate::core::expr::{Query, QueryPlan};
use crate::core::query::{DynamicQueryResult, PageMeta, PageResult, QueryArgs};
use crate::security::options::SecurityOptions;
use crate::security::provider::AuthenticationStateProvider;
use crate::storage::rows;
use crate::storage::{DbContext, DbContextKind, DbContextService, DbContextType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{Connection, SqliteConnection};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Hooks
// ============================================================================

/// Connection and user available to lifecycle hooks.
///
/// Writes made through `conn` belong to the same unit of work as the
/// operation that triggered the hook.
pub struct HookContext<'a> {
    pub conn: &'a mut SqliteConnection,
    pub user_name: Option<&'a str>,
}

/// Lifecycle hooks run around each write
#[async_trait]
pub trait CrudHooks<T: Entity>: Send + Sync {
    async fn before_create(&self, _ctx: &mut HookContext<'_>, _input: &mut T) -> CrudResult<()> {
        Ok(())
    }

    async fn after_create(&self, _ctx: &mut HookContext<'_>, _created: &T) -> CrudResult<()> {
        Ok(())
    }

    async fn before_update(&self, _ctx: &mut HookContext<'_>, _existing: &T) -> CrudResult<()> {
        Ok(())
    }

    async fn after_update(&self, _ctx: &mut HookContext<'_>, _updated: &T) -> CrudResult<()> {
        Ok(())
    }

    async fn before_delete(&self, _ctx: &mut HookContext<'_>, _existing: &T) -> CrudResult<()> {
        Ok(())
    }

    async fn after_delete(&self, _ctx: &mut HookContext<'_>, _deleted: &T) -> CrudResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<T: Entity> CrudHooks<T> for NoHooks {}

// ============================================================================
// Dependencies
// ============================================================================

/// Everything a [`CrudService`] needs, shared between requests
pub struct CrudServiceDependencies<C, T> {
    pub db_context_service: Arc<DbContextService<C>>,
    pub count_cache: Arc<CountCache<T>>,
    pub authentication_state_provider: Arc<dyn AuthenticationStateProvider>,
    pub security_options: SecurityOptions,
    /// Age after which a cached count is recomputed
    pub count_cache_tolerance: Duration,
}

impl<C, T> Clone for CrudServiceDependencies<C, T> {
    fn clone(&self) -> Self {
        Self {
            db_context_service: self.db_context_service.clone(),
            count_cache: self.count_cache.clone(),
            authentication_state_provider: self.authentication_state_provider.clone(),
            security_options: self.security_options.clone(),
            count_cache_tolerance: self.count_cache_tolerance,
        }
    }
}

impl<C, T> fmt::Debug for CrudServiceDependencies<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudServiceDependencies")
            .field("security_options", &self.security_options)
            .field("count_cache_tolerance", &self.count_cache_tolerance)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CrudService
// ============================================================================

/// Create, read, update, delete and query `T` rows in context `C`
pub struct CrudService<C, T> {
    db_context: Arc<DbContext<C>>,
    db_context_service: Arc<DbContextService<C>>,
    count_cache: Arc<CountCache<T>>,
    count_cache_tolerance: Duration,
    user_name: Option<String>,
    hooks: Arc<dyn CrudHooks<T>>,
}

impl<C, T> fmt::Debug for CrudService<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudService")
            .field("db_context", &self.db_context)
            .field("user_name", &self.user_name)
            .finish_non_exhaustive()
    }
}

impl<C: DbContextKind, T: Entity> CrudService<C, T> {
    /// Build a service on a production context, resolving the user name from
    /// the configured identity-provider claim
    pub async fn new(deps: CrudServiceDependencies<C, T>) -> CrudResult<Self> {
        Self::with_hooks(deps, NoHooks).await
    }

    pub async fn with_hooks(
        deps: CrudServiceDependencies<C, T>,
        hooks: impl CrudHooks<T> + 'static,
    ) -> CrudResult<Self> {
        Self::with_shared_hooks(deps, Arc::new(hooks)).await
    }

    /// Like [`with_hooks`](Self::with_hooks), for hooks shared between services
    pub async fn with_shared_hooks(
        deps: CrudServiceDependencies<C, T>,
        hooks: Arc<dyn CrudHooks<T>>,
    ) -> CrudResult<Self> {
        let state = deps
            .authentication_state_provider
            .get_authentication_state()
            .await?;
        let user_name = state
            .user
            .find_first(&deps.security_options.idp_user_name_claim)
            .map(str::to_string);

        let db_context = deps.db_context_service.get_db_context().await?;

        Ok(Self {
            db_context: Arc::new(db_context),
            db_context_service: deps.db_context_service,
            count_cache: deps.count_cache,
            count_cache_tolerance: deps.count_cache_tolerance,
            user_name,
            hooks,
        })
    }

    /// Replace the context with one of another type (for tests)
    pub async fn set_db_context(&mut self, context_type: DbContextType) -> CrudResult<()> {
        let context = self
            .db_context_service
            .get_test_db_context(context_type)
            .await?;
        self.db_context = Arc::new(context);
        Ok(())
    }

    /// Share an existing context (e.g., one unit of work across services)
    pub fn use_db_context(&mut self, db_context: Arc<DbContext<C>>) {
        self.db_context = db_context;
    }

    pub fn db_context(&self) -> Arc<DbContext<C>> {
        self.db_context.clone()
    }

    /// User name stamped on writes
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn count_cache(&self) -> &Arc<CountCache<T>> {
        &self.count_cache
    }

    // === Writes ===

    /// Insert `input`, assigning a GUID when it has none.
    ///
    /// An id of zero is assigned by the database.
    pub async fn create(&self, mut input: T) -> CrudResult<T> {
        let mut guard = self.db_context.connection().await;
        let mut tx = guard.begin().await?;
        let user = self.user_name.as_deref();

        input.set_sys_user(self.user_name.clone());
        self.hooks
            .before_create(&mut hook_context(&mut tx, user), &mut input)
            .await?;

        if input.sys_guid().is_nil() {
            input.set_sys_guid(Uuid::new_v4());
        }
        let id = rows::insert(&mut tx, &input, rows::OnConflict::Fail).await?;
        input.set_id(id);

        self.hooks
            .after_create(&mut hook_context(&mut tx, user), &input)
            .await?;
        tx.commit().await?;

        tracing::debug!(entity = T::entity_name(), id, "created");
        Ok(input)
    }

    /// Overwrite the row with `key` with the values of `input`.
    ///
    /// The stored GUID is kept and the id is forced to `key`.
    pub async fn update(&self, input: T, key: i64) -> CrudResult<T> {
        let mut guard = self.db_context.connection().await;
        let mut tx = guard.begin().await?;
        let user = self.user_name.as_deref();

        let existing = rows::find::<T>(&mut tx, key)
            .await?
            .ok_or_else(|| CrudError::not_found(T::entity_name(), key))?;

        self.hooks
            .before_update(&mut hook_context(&mut tx, user), &existing)
            .await?;

        let mut updated = input;
        updated.set_id(key);
        updated.set_sys_guid(existing.sys_guid());
        updated.set_sys_user(self.user_name.clone());
        rows::update(&mut tx, &updated).await?;

        self.hooks
            .after_update(&mut hook_context(&mut tx, user), &updated)
            .await?;
        tx.commit().await?;

        tracing::debug!(entity = T::entity_name(), id = key, "updated");
        Ok(updated)
    }

    /// Delete the row with `key`, returning it as it was before deletion.
    ///
    /// The deleting user is stamped and saved first, so the archived row
    /// version records who deleted it.
    pub async fn delete(&self, key: i64) -> CrudResult<T> {
        let mut guard = self.db_context.connection().await;
        let user = self.user_name.as_deref();

        let mut existing = {
            let mut tx = guard.begin().await?;
            let existing = rows::find::<T>(&mut tx, key)
                .await?
                .ok_or_else(|| CrudError::not_found(T::entity_name(), key))?;

            self.hooks
                .before_delete(&mut hook_context(&mut tx, user), &existing)
                .await?;
            rows::stamp_sys_user::<T>(&mut tx, key, user).await?;
            tx.commit().await?;
            existing
        };
        existing.set_sys_user(self.user_name.clone());

        let mut tx = guard.begin().await?;
        rows::delete::<T>(&mut tx, key).await?;
        self.hooks
            .after_delete(&mut hook_context(&mut tx, user), &existing)
            .await?;
        tx.commit().await?;

        tracing::debug!(entity = T::entity_name(), id = key, "deleted");
        Ok(existing)
    }

    // === Reads ===

    pub async fn find(&self, key: i64) -> CrudResult<Option<T>> {
        let mut conn = self.db_context.connection().await;
        rows::find::<T>(&mut conn, key).await
    }

    /// Like [`find`](Self::find), failing with `NotFound` when absent
    pub async fn find_required(&self, key: i64) -> CrudResult<T> {
        self.find(key)
            .await?
            .ok_or_else(|| CrudError::not_found(T::entity_name(), key))
    }

    /// Typed page for string query arguments. Any `select` is ignored.
    pub async fn get_page(&self, args: &QueryArgs) -> CrudResult<PageResult<T>> {
        let query = Query::parse(args)?;
        self.get_page_query(&query).await
    }

    /// Typed page for a typed query. Any projection is ignored.
    pub async fn get_page_query(&self, query: &Query) -> CrudResult<PageResult<T>> {
        let query = Query {
            projection: None,
            ..query.clone()
        };
        let (rows, count) = self.run(&query).await?;
        Ok(PageResult {
            data: rows::into_entities(rows)?,
            count_across_pages: count,
        })
    }

    /// Dynamically shaped page: the projected columns when `select` is
    /// given, otherwise every column (plus includes)
    pub async fn get_page_select(&self, args: &QueryArgs) -> CrudResult<PageResult<Value>> {
        let query = Query::parse(args)?;
        self.get_page_select_query(&query).await
    }

    pub async fn get_page_select_query(&self, query: &Query) -> CrudResult<PageResult<Value>> {
        let (rows, count) = self.run(query).await?;
        Ok(PageResult {
            data: rows.into_iter().map(Value::Object).collect(),
            count_across_pages: count,
        })
    }

    /// Raw-string query returning dynamic rows and page metadata.
    ///
    /// `include` may separate navigations with `,` or `;`. The current page
    /// is computed from the caller's `total_records` when given, not from the
    /// count of this query; `row_count` is always the fresh count.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_dynamic_query_result(
        &self,
        select: Option<&str>,
        include: Option<&str>,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        skip: Option<i64>,
        take: Option<i64>,
        total_records: Option<i64>,
    ) -> CrudResult<DynamicQueryResult<Value>> {
        let args = dynamic_args(select, include, where_clause, order_by, skip, take);
        let page = self.get_page_select(&args).await?;
        Ok(PageMeta::compute(page.count_across_pages, skip, take, total_records)
            .into_result(page.data))
    }

    /// Typed counterpart of [`get_dynamic_query_result`](Self::get_dynamic_query_result)
    pub async fn get_dynamic_query_result_typed(
        &self,
        include: Option<&str>,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        skip: Option<i64>,
        take: Option<i64>,
        total_records: Option<i64>,
    ) -> CrudResult<DynamicQueryResult<T>> {
        let args = dynamic_args(None, include, where_clause, order_by, skip, take);
        let page = self.get_page(&args).await?;
        Ok(PageMeta::compute(page.count_across_pages, skip, take, total_records)
            .into_result(page.data))
    }

    /// Rows written after `as_of` (by `SysStart`), ordered by id
    pub async fn get_modified(&self, as_of: DateTime<Utc>) -> CrudResult<Vec<T>> {
        let mut conn = self.db_context.connection().await;
        rows::modified_since::<T>(&mut conn, as_of.naive_utc()).await
    }

    /// Latest `SysStart` in the table, `None` when it is empty
    pub async fn max_sys_start(&self) -> CrudResult<Option<DateTime<Utc>>> {
        let mut conn = self.db_context.connection().await;
        Ok(rows::max_sys_start::<T>(&mut conn)
            .await?
            .map(|dt| dt.and_utc()))
    }

    /// Validate, count (through the cache) and fetch
    async fn run(&self, query: &Query) -> CrudResult<(Vec<Map<String, Value>>, i64)> {
        let plan = QueryPlan::new::<T>(query)?;
        tracing::debug!(entity = T::entity_name(), sql = %plan.select_sql().sql, "query");

        let mut guard = self.db_context.connection().await;
        let fingerprint =
            CountCache::<T>::fingerprint(query.filter_text().as_deref(), &query.parameters);

        let conn: &mut SqliteConnection = &mut guard;
        let plan_ref = &plan;
        let count = self
            .count_cache
            .get_count(&fingerprint, self.count_cache_tolerance, move || {
                rows::count_plan(conn, plan_ref)
            })
            .await?;

        let rows = rows::fetch_plan(&mut guard, &plan).await?;
        Ok((rows, count))
    }
}

fn hook_context<'a>(conn: &'a mut SqliteConnection, user_name: Option<&'a str>) -> HookContext<'a> {
    HookContext { conn, user_name }
}

fn dynamic_args(
    select: Option<&str>,
    include: Option<&str>,
    where_clause: Option<&str>,
    order_by: Option<&str>,
    skip: Option<i64>,
    take: Option<i64>,
) -> QueryArgs {
    QueryArgs {
        filter: where_clause.map(str::to_string),
        filter_parameters: None,
        order_by: order_by.map(str::to_string),
        skip,
        top: take,
        select: select.map(str::to_string),
        expand: include.map(|i| i.replace(';', ",")),
    }
}
