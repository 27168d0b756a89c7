//! Hits API: artists and songs served over REST
//!
//! Every request is authenticated as the configured fake user (`FAKE_USER`
//! overrides it) and gains that user's role from the `AppUser` table.
//! Songs are readable by any authenticated user; user and role management
//! requires the `admin` or `IT` role.
//!
//! ```text
//! cargo run --example hits_api
//! curl 'localhost:3000/songs?filter=Title.Contains(@0)&filter_parameters=["o"]&order_by=ReleaseDate desc&top=4'
//! curl 'localhost:3000/songs/dynamic?select=new (Title, ReleaseDate)&where=ArtistId == 1&take=2'
//! ```

use axum::Router;
use crud::prelude::*;
use crud::security::AppRoleHooks;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "demos/hits_api/hits.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,crud=debug")),
        )
        .init();

    let config = AppConfig::from_yaml_file(CONFIG_PATH)?;

    let hits = Arc::new(DbContextService::<HitsContext>::new(&config)?);
    hits.ensure_created().await?;
    let app_user_roles = Arc::new(DbContextService::<AppUserRolesContext>::new(&config)?);
    app_user_roles.ensure_created().await?;

    let resolver = Arc::new(UserRoleResolver::new(
        Arc::new(SqlRoleStore::new(app_user_roles.clone())),
        Arc::new(RolesCache::with_capacity(config.roles_cache.max_entries)),
        config.security.clone(),
    ));

    let admin = ServerBuilder::new(config.clone())
        .register(CrudResource::<AppUserRolesContext, AppUser>::from_config(
            &config,
            app_user_roles.clone(),
        ))
        .register(
            CrudResource::<AppUserRolesContext, AppRole>::from_config(&config, app_user_roles)
                .with_hooks(AppRoleHooks),
        )
        .with_policy(AuthPolicy::parse_policy("role:admin,IT"))
        .build();

    let catalog = ServerBuilder::new(config.clone())
        .register(CrudResource::<HitsContext, Artist>::from_config(
            &config,
            hits.clone(),
        ))
        .register(CrudResource::<HitsContext, Song>::from_config(&config, hits))
        .with_custom_routes(Router::new().nest("/admin", admin))
        .with_fake_authentication()?
        .with_role_resolver(resolver)
        .with_policy(AuthPolicy::Authenticated);

    catalog.serve("127.0.0.1:3000").await
}
