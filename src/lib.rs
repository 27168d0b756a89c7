//! # crud-rs
//!
//! Generic CRUD services over SQLite tables, with dynamic queries, cached
//! page counts and role-claims enrichment for the requesting user.
//!
//! ## Features
//!
//! - **Generic service**: [`CrudService<C, T>`](core::service::CrudService) creates, updates,
//!   deletes and pages any [`Entity`](core::entity::Entity), stamping the user's name on writes
//! - **Dynamic queries**: filter, sort, projection and include expressions parsed into a typed
//!   AST and checked against each entity's field allow-list before any SQL is built
//! - **Count cache**: totals across pages are reused per filter for a configurable window
//! - **Database contexts**: production, open-transaction (rolled back) and in-memory contexts
//! - **Row history**: `SysStart`/`SysEnd` periods and a `<table>_history` table per entity
//! - **Role claims**: principals gain the role stored for their user in `AppUser`/`AppRole`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crud::prelude::*;
//!
//! let config = AppConfig::from_yaml_file("hits.yaml")?;
//! let hits = Arc::new(DbContextService::<HitsContext>::new(&config)?);
//! hits.ensure_created().await?;
//!
//! let songs = CrudResource::<HitsContext, Song>::from_config(&config, hits);
//! ServerBuilder::new(config)
//!     .with_fake_authentication()?
//!     .register(songs)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod hits;
pub mod security;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        count_cache::CountCache,
        entity::{Entity, Navigation, NavigationKind},
        error::{
            ConfigError, CrudError, CrudResult, EntityError, QueryError, RequestError,
            StorageError,
        },
        expr::{CompareOp, FieldRef, Filter, Operand, Projection, Query, SortKey, TextOp},
        field::{FieldDef, FieldKind, FieldValue},
        query::{DynamicQueryResult, PageMeta, PageResult, QueryArgs},
        service::{CrudHooks, CrudService, CrudServiceDependencies, HookContext, NoHooks},
    };

    // === Macros ===
    pub use crate::impl_entity;

    // === Entities ===
    pub use crate::entities::guid_from_id;
    pub use crate::hits::{Artist, ArtistService, HitsContext, Song, SongService};

    // === Storage ===
    pub use crate::storage::{
        DbContext, DbContextKind, DbContextService, DbContextType, ensure_table,
    };

    // === Security ===
    pub use crate::security::{
        AppRole, AppRoleService, AppUser, AppUserRolesAuthenticationStateProvider,
        AppUserRolesContext, AppUserService, AuthPolicy, AuthenticationState,
        AuthenticationStateProvider, Claim, ClaimsTransformation, Identity, Principal, RoleStore,
        RolesCache, SecurityOptions, SqlRoleStore, StaticAuthenticationStateProvider,
        UNDEFINED_ROLE, UserRoleResolver, UserRolesClaimsTransformation,
    };

    // === Config ===
    pub use crate::config::{AppConfig, CountCacheConfig, RolesCacheConfig};

    // === Server ===
    pub use crate::server::{CrudResource, ServerBuilder, crud_routes};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, NaiveDate, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
    pub use uuid::Uuid;
}
