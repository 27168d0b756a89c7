//! Application users, their roles, and the context storing them

use crate::core::entity::Entity;
use crate::core::error::CrudResult;
use crate::core::service::{CrudHooks, CrudService, CrudServiceDependencies, HookContext};
use crate::entities::guid_from_id;
use crate::storage::{DbContextKind, ensure_table, rows};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

/// A user known to the application, with at most one role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppUser {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub sys_user: Option<String>,
    #[serde(default)]
    pub sys_guid: Uuid,
    pub user_name: String,
    #[serde(default)]
    pub role_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_role: Option<Box<AppRole>>,
}

impl AppUser {
    pub fn new(user_name: impl Into<String>, role_id: Option<i64>) -> Self {
        Self {
            user_name: user_name.into(),
            role_id,
            ..Default::default()
        }
    }
}

crate::impl_entity!(AppUser, "AppUser", "app-users",
    fields: [UserName: Text, RoleId: Integer | null],
    navigations: [AppRole => one(AppRole, "RoleId")]
);

/// A named role shared by any number of users
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppRole {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub sys_user: Option<String>,
    #[serde(default)]
    pub sys_guid: Uuid,
    pub role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_users: Option<Vec<AppUser>>,
}

impl AppRole {
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            ..Default::default()
        }
    }
}

crate::impl_entity!(AppRole, "AppRole", "app-roles",
    fields: [RoleName: Text],
    navigations: [AppUsers => many(AppUser, "RoleId")]
);

// ============================================================================
// Context
// ============================================================================

/// Database holding the `AppRole` and `AppUser` tables
#[derive(Debug, Clone, Copy, Default)]
pub struct AppUserRolesContext;

#[async_trait]
impl DbContextKind for AppUserRolesContext {
    fn name() -> &'static str {
        "AppUserRolesContext"
    }

    async fn create_schema(conn: &mut SqliteConnection) -> CrudResult<()> {
        ensure_table::<AppRole>(conn).await?;
        ensure_table::<AppUser>(conn).await
    }

    async fn seed(conn: &mut SqliteConnection) -> CrudResult<()> {
        rows::seed(conn, &role_data()).await?;
        rows::seed(conn, &user_data()).await
    }
}

const SEED_USER: &str = "SYSTEM";

/// Seeded roles, with negative ids
pub fn role_data() -> Vec<AppRole> {
    ["IT", "admin", "user", "readonly", "disabled"]
        .iter()
        .zip(1..)
        .map(|(name, n)| AppRole {
            id: -n,
            sys_user: Some(SEED_USER.to_string()),
            sys_guid: guid_from_id(-n),
            ..AppRole::new(*name)
        })
        .collect()
}

/// Seeded users; each holds the role with the same id
pub fn user_data() -> Vec<AppUser> {
    ["Starbuck", "Maria", "Darius", "Huan", "Jack"]
        .iter()
        .zip(1..)
        .map(|(name, n)| AppUser {
            id: -n,
            sys_user: Some(SEED_USER.to_string()),
            sys_guid: guid_from_id(-n),
            ..AppUser::new(*name, Some(-n))
        })
        .collect()
}

// ============================================================================
// Services
// ============================================================================

pub type AppUserService = CrudService<AppUserRolesContext, AppUser>;
pub type AppRoleService = CrudService<AppUserRolesContext, AppRole>;

/// Detaches a role's users before the role is deleted
#[derive(Debug, Clone, Copy, Default)]
pub struct AppRoleHooks;

#[async_trait]
impl CrudHooks<AppRole> for AppRoleHooks {
    async fn before_delete(&self, ctx: &mut HookContext<'_>, existing: &AppRole) -> CrudResult<()> {
        let sql = format!(
            "UPDATE \"{}\" SET \"RoleId\" = NULL, \"SysUser\" = ? WHERE \"RoleId\" = ?",
            AppUser::table_name()
        );
        let detached = sqlx::query(&sql)
            .bind(ctx.user_name)
            .bind(existing.id)
            .execute(&mut *ctx.conn)
            .await?
            .rows_affected();
        tracing::debug!(role = %existing.role_name, detached, "detached users from role");
        Ok(())
    }
}

impl AppRoleService {
    /// A role service whose deletes detach the role's users first
    pub async fn for_roles(
        deps: CrudServiceDependencies<AppUserRolesContext, AppRole>,
    ) -> CrudResult<Self> {
        CrudService::with_hooks(deps, AppRoleHooks).await
    }
}
