//! Core module containing fundamental traits and types for the framework

pub mod count_cache;
pub mod entity;
pub mod error;
pub mod expr;
pub mod field;
pub mod query;
pub mod service;

pub use count_cache::CountCache;
pub use entity::{Entity, Navigation, NavigationKind};
pub use error::{CrudError, CrudResult};
pub use field::{FieldDef, FieldKind, FieldValue};
pub use query::{DynamicQueryResult, PageMeta, PageResult, QueryArgs};
pub use service::{CrudHooks, CrudService, CrudServiceDependencies, HookContext, NoHooks};
