//! Users, roles and role resolution against the AppUserRoles database

use crud::prelude::*;
use std::time::Duration;

struct Fixture {
    db_context_service: Arc<DbContextService<AppUserRolesContext>>,
    db_context: Arc<DbContext<AppUserRolesContext>>,
}

impl Fixture {
    async fn in_memory() -> Self {
        let config = AppConfig::default().with_db_context("AppUserRolesContext", "sqlite::memory:");
        let db_context_service =
            Arc::new(DbContextService::<AppUserRolesContext>::new(&config).expect("configured"));
        let db_context = Arc::new(
            db_context_service
                .get_test_db_context(DbContextType::InMemory)
                .await
                .expect("in-memory context"),
        );
        Self {
            db_context_service,
            db_context,
        }
    }

    fn deps<T: Entity>(&self, user: &str) -> CrudServiceDependencies<AppUserRolesContext, T> {
        CrudServiceDependencies {
            db_context_service: self.db_context_service.clone(),
            count_cache: Arc::new(CountCache::new()),
            authentication_state_provider: Arc::new(StaticAuthenticationStateProvider::new(
                Principal::authenticated("Test", vec![Claim::new("preferred_username", user)]),
            )),
            security_options: SecurityOptions::default(),
            count_cache_tolerance: Duration::from_secs(60),
        }
    }

    async fn users(&self, user: &str) -> AppUserService {
        let mut service = AppUserService::new(self.deps(user)).await.expect("service");
        service.use_db_context(self.db_context.clone());
        service
    }

    async fn roles(&self, user: &str) -> AppRoleService {
        let mut service = AppRoleService::for_roles(self.deps(user))
            .await
            .expect("service");
        service.use_db_context(self.db_context.clone());
        service
    }

    fn role_store(&self) -> Arc<SqlRoleStore> {
        Arc::new(SqlRoleStore::with_context(self.db_context.clone()))
    }
}

#[tokio::test]
async fn test_first_page_of_new_users() {
    let fixture = Fixture::in_memory().await;
    let roles = fixture.roles("Starbuck").await;
    let users = fixture.users("Starbuck").await;

    let admin = roles.create(AppRole::new("admin")).await.expect("role");
    let user = roles.create(AppRole::new("user")).await.expect("role");
    users
        .create(AppUser::new("Bob", Some(user.id)))
        .await
        .expect("user");
    users
        .create(AppUser::new("Alice", Some(admin.id)))
        .await
        .expect("user");

    let page = users
        .get_page(
            &QueryArgs::new()
                .filter("UserName == @0 || UserName == @1")
                .parameters(vec!["Alice".into(), "Bob".into()])
                .order_by("UserName")
                .skip(0)
                .top(1),
        )
        .await
        .expect("page");

    assert_eq!(page.count_across_pages, 2);
    let names: Vec<&str> = page.data.iter().map(|u| u.user_name.as_str()).collect();
    assert_eq!(names, vec!["Alice"]);
}

#[tokio::test]
async fn test_deleting_role_detaches_its_users() {
    let fixture = Fixture::in_memory().await;
    let roles = fixture.roles("Starbuck").await;
    let users = fixture.users("Starbuck").await;

    let temp = roles.create(AppRole::new("temp")).await.expect("role");
    for name in ["Ann", "Ben", "Cal"] {
        users
            .create(AppUser::new(name, Some(temp.id)))
            .await
            .expect("user");
    }

    let deleted = roles.delete(temp.id).await.expect("deleted");
    assert_eq!(deleted.role_name, "temp");
    assert!(roles.find(temp.id).await.expect("query").is_none());

    let detached = users
        .get_page(
            &QueryArgs::new()
                .filter("UserName == 'Ann' || UserName == 'Ben' || UserName == 'Cal'"),
        )
        .await
        .expect("page");
    assert_eq!(detached.data.len(), 3);
    for user in &detached.data {
        assert_eq!(user.role_id, None);
        assert_eq!(user.sys_user.as_deref(), Some("Starbuck"));
    }

    // Other users keep their roles
    let maria = users.find_required(-2).await.expect("seeded");
    assert_eq!(maria.role_id, Some(-2));
}

#[tokio::test]
async fn test_deleting_referenced_role_without_hooks_fails() {
    let fixture = Fixture::in_memory().await;
    let mut plain = AppRoleService::new(fixture.deps("Starbuck"))
        .await
        .expect("service");
    plain.use_db_context(fixture.db_context.clone());

    let result = plain.delete(-2).await;
    assert!(matches!(
        result,
        Err(CrudError::Storage(StorageError::ForeignKeyViolation { .. }))
    ));
    assert!(plain.find(-2).await.expect("query").is_some());
}

#[tokio::test]
async fn test_include_users_of_role() {
    let fixture = Fixture::in_memory().await;
    let roles = fixture.roles("Starbuck").await;

    let page = roles
        .get_page(&QueryArgs::new().filter("RoleName == 'admin'").expand("AppUsers"))
        .await
        .expect("page");
    let users = page.data[0].app_users.as_ref().expect("users included");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_name, "Maria");
}

#[tokio::test]
async fn test_sql_role_store_joins_users_and_roles() {
    let fixture = Fixture::in_memory().await;
    let store = fixture.role_store();

    assert_eq!(
        store.find_role("Maria").await.expect("lookup").as_deref(),
        Some("admin")
    );
    assert_eq!(
        store.find_role("Starbuck").await.expect("lookup").as_deref(),
        Some("IT")
    );
    assert_eq!(store.find_role("Nobody").await.expect("lookup"), None);

    let users = fixture.users("Starbuck").await;
    users
        .create(AppUser::new("Roleless", None))
        .await
        .expect("user");
    assert_eq!(store.find_role("Roleless").await.expect("lookup"), None);
}

#[tokio::test]
async fn test_resolver_caches_store_roles() {
    let fixture = Fixture::in_memory().await;
    let resolver = UserRoleResolver::new(
        fixture.role_store(),
        Arc::new(RolesCache::new()),
        SecurityOptions::default(),
    );

    let mut principal =
        Principal::authenticated("Test", vec![Claim::new("preferred_username", "Darius")]);
    assert!(resolver.augment(&mut principal).await.expect("augment"));
    assert!(principal.is_in_role("user"));
    assert_eq!(resolver.cache().get("Darius").as_deref(), Some("user"));

    // The cached role wins until it expires
    let users = fixture.users("Starbuck").await;
    let darius = users.find_required(-3).await.expect("seeded");
    users
        .update(
            AppUser {
                role_id: Some(-4),
                ..darius
            },
            -3,
        )
        .await
        .expect("updated");
    assert_eq!(resolver.resolve_role("Darius").await.expect("role"), "user");

    resolver.cache().remove("Darius");
    assert_eq!(
        resolver.resolve_role("Darius").await.expect("role"),
        "readonly"
    );
}

#[tokio::test]
async fn test_unknown_user_resolves_to_undefined_uncached() {
    let fixture = Fixture::in_memory().await;
    let resolver = UserRoleResolver::new(
        fixture.role_store(),
        Arc::new(RolesCache::new()),
        SecurityOptions::default(),
    );

    let mut principal =
        Principal::authenticated("Test", vec![Claim::new("preferred_username", "Ghost")]);
    resolver.augment(&mut principal).await.expect("augment");
    assert!(principal.is_in_role(UNDEFINED_ROLE));
    assert!(resolver.cache().is_empty());

    // Once assigned, the role is picked up on the next request
    let users = fixture.users("Starbuck").await;
    users
        .create(AppUser::new("Ghost", Some(-3)))
        .await
        .expect("user");
    assert_eq!(resolver.resolve_role("Ghost").await.expect("role"), "user");
}

#[tokio::test]
async fn test_state_provider_adds_roles_from_database() {
    let fixture = Fixture::in_memory().await;
    let resolver = Arc::new(UserRoleResolver::new(
        fixture.role_store(),
        Arc::new(RolesCache::new()),
        SecurityOptions::default(),
    ));
    let provider = AppUserRolesAuthenticationStateProvider::new(
        Arc::new(StaticAuthenticationStateProvider::new(Principal::authenticated(
            "Test",
            vec![Claim::new("PREFERRED_USERNAME", "Jack")],
        ))),
        resolver,
    );

    let state = provider.get_authentication_state().await.expect("state");
    assert_eq!(state.user.roles(), vec!["disabled"]);
    assert_eq!(state.user.identities.len(), 2);
}
