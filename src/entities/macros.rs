//! Macros for reducing boilerplate when defining entities
//!
//! Entity structs declare their own fields (with serde PascalCase names);
//! [`impl_entity!`] generates the [`Entity`](crate::core::entity::Entity)
//! implementation: table metadata, the field allow-list and base-field
//! accessors.

/// Implement [`Entity`](crate::core::entity::Entity) for a struct carrying
/// `id: i64`, `sys_user: Option<String>` and `sys_guid: Uuid`.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// pub struct Song {
///     #[serde(default)]
///     pub id: i64,
///     #[serde(default)]
///     pub sys_user: Option<String>,
///     #[serde(default)]
///     pub sys_guid: Uuid,
///     pub title: String,
///     pub artist_id: i64,
///     #[serde(default, skip_serializing_if = "Option::is_none")]
///     pub artist: Option<Box<Artist>>,
/// }
///
/// impl_entity!(Song, "Song", "songs",
///     fields: [Title: Text, ReleaseDate: Date | null, ArtistId: Integer],
///     navigations: [Artist => one(Artist, "ArtistId")]
/// );
/// ```
#[macro_export]
macro_rules! impl_entity {
    (@nullable null) => { true };
    (@nullable) => { false };

    (
        $type:ident,
        $table:expr,
        $resource:expr,
        fields: [ $( $field:ident : $kind:ident $( | $null:ident )? ),* $(,)? ] $(,)?
        $( navigations: [ $( $nav:ident => $nav_kind:ident ( $target:ty, $fk:expr ) ),* $(,)? ] $(,)? )?
        $( temporal: $temporal:expr $(,)? )?
    ) => {
        impl $crate::core::entity::Entity for $type {
            fn table_name() -> &'static str {
                $table
            }

            fn resource_name() -> &'static str {
                $resource
            }

            fn fields() -> &'static [$crate::core::field::FieldDef] {
                const FIELDS: &[$crate::core::field::FieldDef] = &[
                    $crate::core::entity::BASE_FIELDS[0],
                    $crate::core::entity::BASE_FIELDS[1],
                    $crate::core::entity::BASE_FIELDS[2],
                    $(
                        $crate::core::field::FieldDef {
                            name: stringify!($field),
                            kind: $crate::core::field::FieldKind::$kind,
                            nullable: $crate::impl_entity!(@nullable $( $null )?),
                        },
                    )*
                ];
                FIELDS
            }

            $(
                fn navigations() -> Vec<$crate::core::entity::Navigation> {
                    vec![
                        $( $crate::core::entity::Navigation::$nav_kind::<$target>(stringify!($nav), $fk) ),*
                    ]
                }
            )?

            $(
                fn is_temporal() -> bool {
                    $temporal
                }
            )?

            fn id(&self) -> i64 {
                self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = id;
            }

            fn sys_user(&self) -> Option<&str> {
                self.sys_user.as_deref()
            }

            fn set_sys_user(&mut self, user: Option<String>) {
                self.sys_user = user;
            }

            fn sys_guid(&self) -> ::uuid::Uuid {
                self.sys_guid
            }

            fn set_sys_guid(&mut self, guid: ::uuid::Uuid) {
                self.sys_guid = guid;
            }
        }
    };
}
