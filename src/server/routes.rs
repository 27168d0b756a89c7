//! REST routes for one entity type
//!
//! - `GET    /{resource}`          page of rows (`select` switches to dynamic rows)
//! - `GET    /{resource}/dynamic`  raw-string query with page metadata
//! - `POST   /{resource}`          create (the id is always assigned by the store)
//! - `GET    /{resource}/{id}`     fetch one
//! - `PUT    /{resource}/{id}`     update
//! - `DELETE /{resource}/{id}`     delete, returning the deleted row
//!
//! Every request gets its own [`CrudService`] acting as the request's
//! [`Principal`].

use crate::config::AppConfig;
use crate::core::count_cache::CountCache;
use crate::core::entity::Entity;
use crate::core::error::CrudResult;
use crate::core::query::QueryArgs;
use crate::core::service::{CrudHooks, CrudService, CrudServiceDependencies, NoHooks};
use crate::security::options::SecurityOptions;
use crate::security::principal::Principal;
use crate::security::provider::StaticAuthenticationStateProvider;
use crate::storage::{DbContextKind, DbContextService};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Shared state behind the routes of one entity type
pub struct CrudResource<C, T> {
    db_context_service: Arc<DbContextService<C>>,
    count_cache: Arc<CountCache<T>>,
    security_options: SecurityOptions,
    count_cache_tolerance: Duration,
    hooks: Arc<dyn CrudHooks<T>>,
}

impl<C: DbContextKind, T: Entity> CrudResource<C, T> {
    pub fn new(
        db_context_service: Arc<DbContextService<C>>,
        count_cache: Arc<CountCache<T>>,
        security_options: SecurityOptions,
        count_cache_tolerance: Duration,
    ) -> Self {
        Self {
            db_context_service,
            count_cache,
            security_options,
            count_cache_tolerance,
            hooks: Arc::new(NoHooks),
        }
    }

    /// A resource with a fresh count cache sized and timed from `config`
    pub fn from_config(config: &AppConfig, db_context_service: Arc<DbContextService<C>>) -> Self {
        Self::new(
            db_context_service,
            Arc::new(CountCache::with_capacity(config.count_cache.max_entries)),
            config.security.clone(),
            config.count_cache.tolerance(),
        )
    }

    pub fn with_hooks(mut self, hooks: impl CrudHooks<T> + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn count_cache(&self) -> &Arc<CountCache<T>> {
        &self.count_cache
    }

    /// A service acting as `principal`
    pub async fn service(&self, principal: Principal) -> CrudResult<CrudService<C, T>> {
        let deps = CrudServiceDependencies {
            db_context_service: self.db_context_service.clone(),
            count_cache: self.count_cache.clone(),
            authentication_state_provider: Arc::new(StaticAuthenticationStateProvider::new(
                principal,
            )),
            security_options: self.security_options.clone(),
            count_cache_tolerance: self.count_cache_tolerance,
        };
        CrudService::with_shared_hooks(deps, self.hooks.clone()).await
    }
}

/// Build the CRUD routes of `T`
pub fn crud_routes<C: DbContextKind, T: Entity>(resource: Arc<CrudResource<C, T>>) -> Router {
    let collection = format!("/{}", T::resource_name());
    let dynamic = format!("/{}/dynamic", T::resource_name());
    let item = format!("/{}/{{id}}", T::resource_name());

    Router::new()
        .route(&collection, get(list::<C, T>).post(create::<C, T>))
        .route(&dynamic, get(dynamic_query::<C, T>))
        .route(
            &item,
            get(fetch::<C, T>)
                .put(update::<C, T>)
                .delete(remove::<C, T>),
        )
        .with_state(resource)
}

type ResourceState<C, T> = State<Arc<CrudResource<C, T>>>;

async fn list<C: DbContextKind, T: Entity>(
    State(resource): ResourceState<C, T>,
    principal: Principal,
    Query(args): Query<QueryArgs>,
) -> CrudResult<Response> {
    let service = resource.service(principal).await?;
    if args.select.is_some() {
        Ok(Json(service.get_page_select(&args).await?).into_response())
    } else {
        Ok(Json(service.get_page(&args).await?).into_response())
    }
}

/// Query string of the raw dynamic-query endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DynamicQueryParams {
    pub select: Option<String>,
    pub include: Option<String>,
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub order_by: Option<String>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub total_records: Option<i64>,
}

async fn dynamic_query<C: DbContextKind, T: Entity>(
    State(resource): ResourceState<C, T>,
    principal: Principal,
    Query(params): Query<DynamicQueryParams>,
) -> CrudResult<Response> {
    let service = resource.service(principal).await?;
    let result = service
        .get_dynamic_query_result(
            params.select.as_deref(),
            params.include.as_deref(),
            params.where_clause.as_deref(),
            params.order_by.as_deref(),
            params.skip,
            params.take,
            params.total_records,
        )
        .await?;
    Ok(Json(result).into_response())
}

async fn fetch<C: DbContextKind, T: Entity>(
    State(resource): ResourceState<C, T>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrudResult<Json<T>> {
    let service = resource.service(principal).await?;
    Ok(Json(service.find_required(id).await?))
}

async fn create<C: DbContextKind, T: Entity>(
    State(resource): ResourceState<C, T>,
    principal: Principal,
    Json(mut input): Json<T>,
) -> CrudResult<(StatusCode, Json<T>)> {
    input.set_id(0);
    let service = resource.service(principal).await?;
    let created = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<C: DbContextKind, T: Entity>(
    State(resource): ResourceState<C, T>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(input): Json<T>,
) -> CrudResult<Json<T>> {
    let service = resource.service(principal).await?;
    Ok(Json(service.update(input, id).await?))
}

async fn remove<C: DbContextKind, T: Entity>(
    State(resource): ResourceState<C, T>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrudResult<Json<T>> {
    let service = resource.service(principal).await?;
    Ok(Json(service.delete(id).await?))
}
