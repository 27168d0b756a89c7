//! Sources of the current user's authentication state

use super::principal::Principal;
use crate::core::error::CrudResult;
use async_trait::async_trait;

/// The authenticated user at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationState {
    pub user: Principal,
}

impl AuthenticationState {
    pub fn new(user: Principal) -> Self {
        Self { user }
    }
}

/// Yields the authentication state of the current request or session
#[async_trait]
pub trait AuthenticationStateProvider: Send + Sync {
    async fn get_authentication_state(&self) -> CrudResult<AuthenticationState>;
}

/// Provider returning a fixed principal (one per request, or for tests)
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticationStateProvider {
    state: AuthenticationState,
}

impl StaticAuthenticationStateProvider {
    pub fn new(user: Principal) -> Self {
        Self {
            state: AuthenticationState::new(user),
        }
    }
}

#[async_trait]
impl AuthenticationStateProvider for StaticAuthenticationStateProvider {
    async fn get_authentication_state(&self) -> CrudResult<AuthenticationState> {
        Ok(self.state.clone())
    }
}
