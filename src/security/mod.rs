//! Principals, role resolution and authorization
//!
//! Role claims come from the `AppUser`/`AppRole` tables: see [`roles`] for the
//! resolution rules and [`middleware`] for wiring them into a router.

pub mod app_user;
pub mod middleware;
pub mod options;
pub mod policy;
pub mod principal;
pub mod provider;
pub mod roles;
pub mod roles_cache;

pub use app_user::{
    AppRole, AppRoleHooks, AppRoleService, AppUser, AppUserRolesContext, AppUserService,
};
pub use middleware::{
    FakeAuthentication, app_user_roles_middleware, fake_authentication, require_policy,
};
pub use options::SecurityOptions;
pub use policy::AuthPolicy;
pub use principal::{Claim, Identity, NAME_CLAIM, Principal, ROLE_CLAIM, ROLE_CLAIM_URI};
pub use provider::{
    AuthenticationState, AuthenticationStateProvider, StaticAuthenticationStateProvider,
};
pub use roles::{
    AppUserRolesAuthenticationStateProvider, ClaimsTransformation, RoleStore, SqlRoleStore,
    UNDEFINED_ROLE, UserRoleResolver, UserRolesClaimsTransformation,
};
pub use roles_cache::RolesCache;
