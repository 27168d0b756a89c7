//! Role resolution and claims augmentation.
//!
//! A principal that already carries a `role` claim passes through. Otherwise
//! its user name (the identity provider's user-name claim) is looked up in
//! the user/role tables, through a [`RolesCache`], and a new identity with
//! the role claims is added. Users without a role resolve to
//! [`UNDEFINED_ROLE`], which is never cached.
//!
//! The same logic is offered as a claims transformation, as a wrapping
//! authentication state provider and as axum middleware
//! ([`app_user_roles_middleware`](super::middleware::app_user_roles_middleware)).

use super::app_user::AppUserRolesContext;
use super::options::SecurityOptions;
use super::principal::{Claim, Identity, Principal, ROLE_CLAIM, ROLE_CLAIM_URI};
use super::provider::{AuthenticationState, AuthenticationStateProvider};
use super::roles_cache::RolesCache;
use crate::config::AppConfig;
use crate::core::error::CrudResult;
use crate::storage::{DbContext, DbContextService};
use async_trait::async_trait;
use std::sync::Arc;

/// Role of users that have none
pub const UNDEFINED_ROLE: &str = "undefined";

// ============================================================================
// Role store
// ============================================================================

/// Looks up the role assigned to a user
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Name of the user's role, `None` when the user is unknown or has none
    async fn find_role(&self, user_name: &str) -> CrudResult<Option<String>>;
}

enum RoleSource {
    Service(Arc<DbContextService<AppUserRolesContext>>),
    Context(Arc<DbContext<AppUserRolesContext>>),
}

/// [`RoleStore`] joining the `AppUser` and `AppRole` tables
pub struct SqlRoleStore {
    source: RoleSource,
}

impl SqlRoleStore {
    /// Each lookup uses a fresh production context
    pub fn new(db_context_service: Arc<DbContextService<AppUserRolesContext>>) -> Self {
        Self {
            source: RoleSource::Service(db_context_service),
        }
    }

    /// Every lookup goes through one shared context
    pub fn with_context(db_context: Arc<DbContext<AppUserRolesContext>>) -> Self {
        Self {
            source: RoleSource::Context(db_context),
        }
    }
}

const FIND_ROLE_SQL: &str = "SELECT r.\"RoleName\" FROM \"AppRole\" r \
     JOIN \"AppUser\" u ON r.\"Id\" = u.\"RoleId\" \
     WHERE u.\"UserName\" = ? LIMIT 1";

async fn find_role_in(
    db_context: &DbContext<AppUserRolesContext>,
    user_name: &str,
) -> CrudResult<Option<String>> {
    let mut conn = db_context.connection().await;
    let role = sqlx::query_scalar::<_, String>(FIND_ROLE_SQL)
        .bind(user_name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(role)
}

#[async_trait]
impl RoleStore for SqlRoleStore {
    async fn find_role(&self, user_name: &str) -> CrudResult<Option<String>> {
        match &self.source {
            RoleSource::Service(service) => {
                let db_context = service.get_db_context().await?;
                find_role_in(&db_context, user_name).await
            }
            RoleSource::Context(db_context) => find_role_in(db_context, user_name).await,
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Cached user-to-role resolution shared by all augmentation surfaces
pub struct UserRoleResolver {
    store: Arc<dyn RoleStore>,
    cache: Arc<RolesCache>,
    options: SecurityOptions,
}

impl UserRoleResolver {
    pub fn new(store: Arc<dyn RoleStore>, cache: Arc<RolesCache>, options: SecurityOptions) -> Self {
        Self {
            store,
            cache,
            options,
        }
    }

    /// A resolver reading the configured `AppUserRolesContext` database
    pub fn from_config(config: &AppConfig) -> CrudResult<Self> {
        let db_context_service = Arc::new(DbContextService::<AppUserRolesContext>::new(config)?);
        Ok(Self::new(
            Arc::new(SqlRoleStore::new(db_context_service)),
            Arc::new(RolesCache::with_capacity(config.roles_cache.max_entries)),
            config.security.clone(),
        ))
    }

    pub fn cache(&self) -> &Arc<RolesCache> {
        &self.cache
    }

    pub fn options(&self) -> &SecurityOptions {
        &self.options
    }

    /// The user's role, from the cache while fresh
    pub async fn resolve_role(&self, user_name: &str) -> CrudResult<String> {
        if let Some(role) = self.cache.get(user_name) {
            tracing::debug!(user_name, role = %role, "role cache hit");
            return Ok(role);
        }

        match self.store.find_role(user_name).await? {
            Some(role) => {
                self.cache
                    .insert(user_name, &role, self.options.refresh_interval());
                tracing::debug!(user_name, role = %role, "role resolved");
                Ok(role)
            }
            None => {
                tracing::warn!(user_name, "no role found for user");
                Ok(UNDEFINED_ROLE.to_string())
            }
        }
    }

    /// Add role claims to `principal` unless it already has a role.
    ///
    /// Returns whether claims were added.
    pub async fn augment(&self, principal: &mut Principal) -> CrudResult<bool> {
        if principal.has_claim_type(ROLE_CLAIM) {
            return Ok(false);
        }
        let Some(user_name) = principal
            .find_first(&self.options.idp_user_name_claim)
            .map(str::to_string)
        else {
            return Ok(false);
        };

        let role = self.resolve_role(&user_name).await?;
        principal.add_identity(Identity::new(
            None,
            vec![
                Claim::new(ROLE_CLAIM, role.clone()),
                Claim::new(ROLE_CLAIM_URI, role),
            ],
        ));
        Ok(true)
    }
}

// ============================================================================
// Surfaces
// ============================================================================

/// Enriches a principal before authorization decisions are made
#[async_trait]
pub trait ClaimsTransformation: Send + Sync {
    async fn transform(&self, principal: Principal) -> CrudResult<Principal>;
}

/// Claims transformation adding the user's role
pub struct UserRolesClaimsTransformation {
    resolver: Arc<UserRoleResolver>,
}

impl UserRolesClaimsTransformation {
    pub fn new(resolver: Arc<UserRoleResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ClaimsTransformation for UserRolesClaimsTransformation {
    async fn transform(&self, mut principal: Principal) -> CrudResult<Principal> {
        self.resolver.augment(&mut principal).await?;
        Ok(principal)
    }
}

/// Authentication state provider adding the user's role to the state of
/// the provider it wraps
pub struct AppUserRolesAuthenticationStateProvider {
    inner: Arc<dyn AuthenticationStateProvider>,
    resolver: Arc<UserRoleResolver>,
}

impl AppUserRolesAuthenticationStateProvider {
    pub fn new(
        inner: Arc<dyn AuthenticationStateProvider>,
        resolver: Arc<UserRoleResolver>,
    ) -> Self {
        Self { inner, resolver }
    }
}

#[async_trait]
impl AuthenticationStateProvider for AppUserRolesAuthenticationStateProvider {
    async fn get_authentication_state(&self) -> CrudResult<AuthenticationState> {
        let mut state = self.inner.get_authentication_state().await?;
        self.resolver.augment(&mut state.user).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::provider::StaticAuthenticationStateProvider;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        roles: HashMap<String, String>,
        lookups: AtomicUsize,
    }

    impl CountingStore {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                roles: pairs
                    .iter()
                    .map(|(u, r)| (u.to_string(), r.to_string()))
                    .collect(),
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RoleStore for CountingStore {
        async fn find_role(&self, user_name: &str) -> CrudResult<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.roles.get(user_name).cloned())
        }
    }

    fn resolver(store: Arc<CountingStore>) -> UserRoleResolver {
        UserRoleResolver::new(store, Arc::new(RolesCache::new()), SecurityOptions::default())
    }

    fn user(name: &str) -> Principal {
        Principal::authenticated("Test", vec![Claim::new("preferred_username", name)])
    }

    #[tokio::test]
    async fn test_assigned_role_is_cached() {
        let store = Arc::new(CountingStore::new(&[("Alice", "admin")]));
        let resolver = resolver(store.clone());

        assert_eq!(resolver.resolve_role("Alice").await.expect("role"), "admin");
        assert_eq!(resolver.resolve_role("Alice").await.expect("role"), "admin");
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undefined_role_is_never_cached() {
        let store = Arc::new(CountingStore::new(&[]));
        let resolver = resolver(store.clone());

        for _ in 0..3 {
            assert_eq!(
                resolver.resolve_role("Nobody").await.expect("role"),
                UNDEFINED_ROLE
            );
        }
        assert_eq!(store.lookups.load(Ordering::SeqCst), 3);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_expired_role_is_looked_up_again() {
        let store = Arc::new(CountingStore::new(&[("Bob", "user")]));
        let resolver = UserRoleResolver::new(
            store.clone(),
            Arc::new(RolesCache::new()),
            SecurityOptions {
                refresh_interval: 10,
                ..Default::default()
            },
        );

        resolver.resolve_role("Bob").await.expect("role");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        resolver.resolve_role("Bob").await.expect("role");
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transformation_adds_both_role_claims() {
        let store = Arc::new(CountingStore::new(&[("Alice", "admin")]));
        let transformation = UserRolesClaimsTransformation::new(Arc::new(resolver(store)));

        let principal = transformation.transform(user("Alice")).await.expect("ok");
        assert_eq!(principal.identities.len(), 2);
        assert!(principal.has_claim_type(ROLE_CLAIM));
        assert!(principal.has_claim_type(ROLE_CLAIM_URI));
        assert!(principal.is_in_role("admin"));
    }

    #[tokio::test]
    async fn test_existing_role_claim_passes_through() {
        let store = Arc::new(CountingStore::new(&[("Alice", "admin")]));
        let transformation = UserRolesClaimsTransformation::new(Arc::new(resolver(store.clone())));

        let principal = Principal::authenticated(
            "Test",
            vec![
                Claim::new("preferred_username", "Alice"),
                Claim::new(ROLE_CLAIM, "user"),
            ],
        );
        let transformed = transformation.transform(principal.clone()).await.expect("ok");
        assert_eq!(transformed, principal);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_principal_without_user_name_passes_through() {
        let store = Arc::new(CountingStore::new(&[]));
        let transformation = UserRolesClaimsTransformation::new(Arc::new(resolver(store)));
        let principal = Principal::authenticated("Test", vec![Claim::new("email", "a@b.c")]);
        let transformed = transformation.transform(principal.clone()).await.expect("ok");
        assert_eq!(transformed, principal);
    }

    #[tokio::test]
    async fn test_state_provider_augments_inner_state() {
        let store = Arc::new(CountingStore::new(&[("Bob", "user")]));
        let provider = AppUserRolesAuthenticationStateProvider::new(
            Arc::new(StaticAuthenticationStateProvider::new(user("Bob"))),
            Arc::new(resolver(store)),
        );
        let state = provider.get_authentication_state().await.expect("state");
        assert!(state.user.is_in_role("user"));
    }
}
