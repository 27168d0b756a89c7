//! Server module: REST routes per entity and the builder serving them
//!
//! [`crud_routes`] exposes one entity type; [`ServerBuilder`] combines
//! resources with authentication, role-claims augmentation and an
//! authorization policy.

pub mod builder;
pub mod routes;

pub use builder::ServerBuilder;
pub use routes::{CrudResource, DynamicQueryParams, crud_routes};
