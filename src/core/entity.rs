//! Entity trait defining the persisted shape of every CRUD type

use crate::core::error::QueryError;
use crate::core::field::{FieldDef, FieldKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Columns every entity carries.
///
/// - `Id`: integer identity, assigned by the store when zero on insert
/// - `SysUser`: user name of the principal that last wrote the row
/// - `SysGuid`: globally unique identifier, assigned once at creation
pub const BASE_FIELDS: [FieldDef; 3] = [
    FieldDef::new("Id", FieldKind::Integer),
    FieldDef::nullable("SysUser", FieldKind::Text),
    FieldDef::new("SysGuid", FieldKind::Uuid),
];

/// Base trait for all entities handled by [`CrudService`](crate::core::service::CrudService).
///
/// Entities serialize with PascalCase property names that match their
/// column names, so a row read as JSON deserializes straight into the type.
/// Navigation properties are optional and only populated when requested
/// through an include.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Table holding the rows of this entity
    fn table_name() -> &'static str;

    /// The plural resource name used in URLs (e.g., "songs")
    fn resource_name() -> &'static str;

    /// Every column that may be read, written, filtered, sorted or projected.
    ///
    /// The first three entries are always [`BASE_FIELDS`].
    fn fields() -> &'static [FieldDef];

    /// Navigation properties that can be eager-loaded
    fn navigations() -> Vec<Navigation> {
        Vec::new()
    }

    /// Whether the table carries `SysStart`/`SysEnd` period columns
    fn is_temporal() -> bool {
        true
    }

    // === Base fields ===

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    fn sys_user(&self) -> Option<&str>;

    fn set_sys_user(&mut self, user: Option<String>);

    fn sys_guid(&self) -> Uuid;

    fn set_sys_guid(&mut self, guid: Uuid);

    /// Entity type name used in error messages
    fn entity_name() -> &'static str {
        Self::table_name()
    }
}

/// How a navigation relates the owning entity to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// The owner holds a foreign key to the target's `Id`
    One,
    /// The target holds a foreign key to the owner's `Id`
    Many,
}

/// An eager-loadable relationship
#[derive(Debug, Clone)]
pub struct Navigation {
    /// Property name on the owning entity (e.g., "Songs")
    pub name: &'static str,
    pub kind: NavigationKind,
    /// Foreign key column (on the owner for `One`, on the target for `Many`)
    pub foreign_key: &'static str,
    pub target_table: &'static str,
    pub target_fields: &'static [FieldDef],
    /// Navigations of the target, for dotted include paths
    pub target_navigations: fn() -> Vec<Navigation>,
}

impl Navigation {
    /// A reference from the owner to a single target row
    pub fn one<T: Entity>(name: &'static str, foreign_key: &'static str) -> Self {
        Self {
            name,
            kind: NavigationKind::One,
            foreign_key,
            target_table: T::table_name(),
            target_fields: T::fields(),
            target_navigations: T::navigations,
        }
    }

    /// A collection of target rows referencing the owner
    pub fn many<T: Entity>(name: &'static str, foreign_key: &'static str) -> Self {
        Self {
            name,
            kind: NavigationKind::Many,
            foreign_key,
            target_table: T::table_name(),
            target_fields: T::fields(),
            target_navigations: T::navigations,
        }
    }

    /// Resolve a caller-supplied navigation name, ignoring case
    pub fn resolve(navigations: &[Navigation], name: &str) -> Option<Navigation> {
        navigations
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Resolve a dotted include path such as `Artist.Songs` on `owner`,
    /// one navigation per segment
    pub fn resolve_path(
        owner: &'static str,
        navigations: &[Navigation],
        path: &str,
    ) -> Result<Vec<Navigation>, QueryError> {
        let mut resolved: Vec<Navigation> = Vec::new();
        for segment in path.split('.').map(str::trim) {
            let (entity_type, found) = match resolved.last() {
                None => (owner, Self::resolve(navigations, segment)),
                Some(previous) => (
                    previous.target_table,
                    Self::resolve(&(previous.target_navigations)(), segment),
                ),
            };
            let navigation = found.ok_or_else(|| QueryError::UnknownNavigation {
                entity_type: entity_type.to_string(),
                navigation: segment.to_string(),
            })?;
            resolved.push(navigation);
        }
        Ok(resolved)
    }
}
