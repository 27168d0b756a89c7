use super::Song;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A performer or band
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Artist {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub sys_user: Option<String>,
    #[serde(default)]
    pub sys_guid: Uuid,
    pub name: String,
    #[serde(default)]
    pub is_solo: bool,
    /// Loaded only when `Songs` is included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub songs: Option<Vec<Song>>,
}

impl Artist {
    pub fn new(name: impl Into<String>, is_solo: bool) -> Self {
        Self {
            name: name.into(),
            is_solo,
            ..Default::default()
        }
    }
}

crate::impl_entity!(Artist, "Artist", "artists",
    fields: [Name: Text, IsSolo: Boolean],
    navigations: [Songs => many(Song, "ArtistId")]
);
