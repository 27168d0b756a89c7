//! Axum middleware carrying the [`Principal`] through a request
//!
//! Authentication middleware (or [`fake_authentication`] in development)
//! stores a `Principal` in the request extensions,
//! [`app_user_roles_middleware`] adds the user's role to it and
//! [`require_policy`] rejects requests the principal may not make.
//! Handlers take the principal as an extractor.

use super::policy::AuthPolicy;
use super::principal::{Claim, NAME_CLAIM, Principal};
use super::roles::UserRoleResolver;
use crate::config::AppConfig;
use crate::core::error::{CrudError, CrudResult, RequestError};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use std::convert::Infallible;
use std::sync::Arc;

/// Authentication type of principals created by [`fake_authentication`]
pub const FAKE_AUTHENTICATION_TYPE: &str = "Fake";

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Principal>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Adds role claims to the request's principal
pub async fn app_user_roles_middleware(
    State(resolver): State<Arc<UserRoleResolver>>,
    mut request: Request,
    next: Next,
) -> Result<Response, CrudError> {
    if let Some(principal) = request.extensions_mut().get_mut::<Principal>() {
        resolver.augment(principal).await?;
    }
    Ok(next.run(request).await)
}

/// Development authentication: every request is made by one configured user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeAuthentication {
    user_name: String,
    user_name_claim: String,
}

impl FakeAuthentication {
    pub fn new(user_name: impl Into<String>, user_name_claim: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            user_name_claim: user_name_claim.into(),
        }
    }

    /// Fails when no fake user is configured
    pub fn from_config(config: &AppConfig) -> CrudResult<Self> {
        Ok(Self::new(
            config.required_fake_user()?,
            config.security.idp_user_name_claim.clone(),
        ))
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// The principal every request is authenticated as
    pub fn principal(&self) -> Principal {
        Principal::authenticated(
            FAKE_AUTHENTICATION_TYPE,
            vec![
                Claim::new(self.user_name_claim.clone(), self.user_name.clone()),
                Claim::new(NAME_CLAIM, self.user_name.clone()),
            ],
        )
    }
}

/// Authenticates every request as the configured fake user
pub async fn fake_authentication(
    State(fake): State<Arc<FakeAuthentication>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(fake.principal());
    next.run(request).await
}

/// Rejects requests whose principal does not satisfy the policy.
///
/// Unauthenticated callers get 401, authenticated ones 403.
pub async fn require_policy(
    State(policy): State<Arc<AuthPolicy>>,
    request: Request,
    next: Next,
) -> Result<Response, CrudError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or_default();

    if policy.check(&principal) {
        return Ok(next.run(request).await);
    }

    if policy.requires_authentication() && !principal.is_authenticated() {
        return Err(RequestError::Unauthorized {
            message: "authentication required".to_string(),
        }
        .into());
    }

    tracing::debug!(roles = ?principal.roles(), "request denied by policy");
    Err(RequestError::Forbidden {
        message: "insufficient role".to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::options::SecurityOptions;
    use crate::security::principal::ROLE_CLAIM;
    use crate::security::roles::RoleStore;
    use crate::security::roles_cache::RolesCache;
    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::middleware;
    use axum::routing::get;
    use tower::ServiceExt;

    struct OneRole;

    #[async_trait]
    impl RoleStore for OneRole {
        async fn find_role(&self, user_name: &str) -> CrudResult<Option<String>> {
            Ok((user_name == "Maria").then(|| "admin".to_string()))
        }
    }

    async fn roles_of(principal: Principal) -> String {
        principal.roles().join(",")
    }

    fn app(user: &str, policy: AuthPolicy) -> Router {
        let resolver = Arc::new(UserRoleResolver::new(
            Arc::new(OneRole),
            Arc::new(RolesCache::new()),
            SecurityOptions::default(),
        ));
        let fake = Arc::new(FakeAuthentication::new(user, "preferred_username"));

        // The last layer added runs first
        Router::new()
            .route("/roles", get(roles_of))
            .layer(middleware::from_fn_with_state(
                Arc::new(policy),
                require_policy,
            ))
            .layer(middleware::from_fn_with_state(
                resolver,
                app_user_roles_middleware,
            ))
            .layer(middleware::from_fn_with_state(fake, fake_authentication))
    }

    async fn get_roles(app: Router) -> (StatusCode, String) {
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/roles")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_fake_user_gets_resolved_role() {
        let (status, body) = get_roles(app("Maria", AuthPolicy::Authenticated)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn test_unknown_user_is_undefined_and_forbidden() {
        let (status, _) =
            get_roles(app("Nobody", AuthPolicy::HasRole(vec!["admin".into()]))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = get_roles(app("Nobody", AuthPolicy::Authenticated)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "undefined");
    }

    #[tokio::test]
    async fn test_missing_principal_is_unauthorized() {
        let app = Router::new().route("/roles", get(roles_of)).layer(
            middleware::from_fn_with_state(Arc::new(AuthPolicy::Authenticated), require_policy),
        );
        let (status, _) = get_roles(app).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_fake_principal_claims() {
        let principal = FakeAuthentication::new("Huan", "preferred_username").principal();
        assert!(principal.is_authenticated());
        assert_eq!(principal.find_first("preferred_username"), Some("Huan"));
        assert_eq!(principal.find_first(NAME_CLAIM), Some("Huan"));
        assert!(!principal.has_claim_type(ROLE_CLAIM));
    }

    #[test]
    fn test_fake_authentication_requires_configured_user() {
        let config = AppConfig::default();
        if std::env::var(crate::config::FAKE_USER_ENV).is_err() {
            assert!(FakeAuthentication::from_config(&config).is_err());
        }
        let config = AppConfig {
            fake_user: Some("Jack".to_string()),
            ..Default::default()
        };
        let fake = FakeAuthentication::from_config(&config).expect("configured");
        assert_eq!(fake.user_name(), "Jack");
    }
}
