use super::Artist;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A released song
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Song {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub sys_user: Option<String>,
    #[serde(default)]
    pub sys_guid: Uuid,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    pub artist_id: i64,
    /// Loaded only when `Artist` is included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<Box<Artist>>,
}

impl Song {
    pub fn new(title: impl Into<String>, release_date: Option<NaiveDate>, artist_id: i64) -> Self {
        Self {
            title: title.into(),
            release_date,
            artist_id,
            ..Default::default()
        }
    }
}

crate::impl_entity!(Song, "Song", "songs",
    fields: [Title: Text, ReleaseDate: Date | null, ArtistId: Integer],
    navigations: [Artist => one(Artist, "ArtistId")]
);
