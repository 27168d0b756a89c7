//! ServerBuilder for fluent API to build HTTP servers

use super::routes::{CrudResource, crud_routes};
use crate::config::AppConfig;
use crate::core::entity::Entity;
use crate::core::error::CrudResult;
use crate::security::middleware::{
    FakeAuthentication, app_user_roles_middleware, fake_authentication, require_policy,
};
use crate::security::policy::AuthPolicy;
use crate::security::roles::UserRoleResolver;
use crate::storage::DbContextKind;
use anyhow::Result;
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Builder for creating HTTP servers from CRUD resources
///
/// Requests pass, in order, through fake authentication (when enabled),
/// role-claims augmentation (when a resolver is set) and the authorization
/// policy before reaching a resource. Health routes skip the policy.
///
/// # Example
///
/// ```ignore
/// let config = AppConfig::from_yaml_file("hits.yaml")?;
/// let songs = CrudResource::<HitsContext, Song>::from_config(&config, hits.clone());
///
/// ServerBuilder::new(config.clone())
///     .with_fake_authentication()?
///     .with_role_resolver(Arc::new(UserRoleResolver::from_config(&config)?))
///     .with_policy(AuthPolicy::Authenticated)
///     .register(songs)
///     .serve("127.0.0.1:3000")
///     .await?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    resource_routes: Vec<Router>,
    custom_routes: Vec<Router>,
    fake_authentication: Option<Arc<FakeAuthentication>>,
    role_resolver: Option<Arc<UserRoleResolver>>,
    policy: AuthPolicy,
}

impl ServerBuilder {
    /// Create a new ServerBuilder; every route is public until a policy is set
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            resource_routes: Vec::new(),
            custom_routes: Vec::new(),
            fake_authentication: None,
            role_resolver: None,
            policy: AuthPolicy::Public,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Expose the CRUD routes of an entity
    pub fn register<C: DbContextKind, T: Entity>(mut self, resource: CrudResource<C, T>) -> Self {
        tracing::debug!(resource = T::resource_name(), "registering CRUD routes");
        self.resource_routes.push(crud_routes(Arc::new(resource)));
        self
    }

    /// Add routes that don't fit the CRUD pattern. They are subject to the
    /// same policy as the resources.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Authenticate every request as the configured `fake_user`.
    ///
    /// Fails when none is configured.
    pub fn with_fake_authentication(mut self) -> CrudResult<Self> {
        let fake = FakeAuthentication::from_config(&self.config)?;
        tracing::warn!(user = fake.user_name(), "fake authentication enabled");
        self.fake_authentication = Some(Arc::new(fake));
        Ok(self)
    }

    /// Add role claims to every request's principal
    pub fn with_role_resolver(mut self, resolver: Arc<UserRoleResolver>) -> Self {
        self.role_resolver = Some(resolver);
        self
    }

    /// Policy every resource and custom route requires
    pub fn with_policy(mut self, policy: AuthPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the final router
    pub fn build(self) -> Router {
        let mut app = Router::new();
        for routes in self.resource_routes.into_iter().chain(self.custom_routes) {
            app = app.merge(routes);
        }

        // Layers added last run first
        app = app
            .layer(middleware::from_fn_with_state(
                Arc::new(self.policy),
                require_policy,
            ))
            .merge(health_routes());

        if let Some(resolver) = self.role_resolver {
            app = app.layer(middleware::from_fn_with_state(
                resolver,
                app_user_roles_middleware,
            ));
        }
        if let Some(fake) = self.fake_authentication {
            app = app.layer(middleware::from_fn_with_state(fake, fake_authentication));
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "crud-rs"
    }))
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
