use super::{Artist, Song};
use crate::core::error::CrudResult;
use crate::entities::guid_from_id;
use crate::storage::{DbContextKind, ensure_table, rows};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqliteConnection;

/// Database holding the `Artist` and `Song` tables
#[derive(Debug, Clone, Copy, Default)]
pub struct HitsContext;

#[async_trait]
impl DbContextKind for HitsContext {
    fn name() -> &'static str {
        "HitsContext"
    }

    async fn create_schema(conn: &mut SqliteConnection) -> CrudResult<()> {
        ensure_table::<Artist>(conn).await?;
        ensure_table::<Song>(conn).await
    }

    async fn seed(conn: &mut SqliteConnection) -> CrudResult<()> {
        rows::seed(conn, &artists()).await?;
        rows::seed(conn, &songs()).await
    }
}

const SEED_USER: &str = "SYSTEM";

fn artist(id: i64, name: &str, is_solo: bool) -> Artist {
    Artist {
        id,
        sys_user: Some(SEED_USER.to_string()),
        sys_guid: guid_from_id(id),
        ..Artist::new(name, is_solo)
    }
}

fn song(id: i64, title: &str, (y, m, d): (i32, u32, u32), artist_id: i64) -> Song {
    Song {
        id,
        sys_user: Some(SEED_USER.to_string()),
        sys_guid: guid_from_id(id),
        ..Song::new(title, NaiveDate::from_ymd_opt(y, m, d), artist_id)
    }
}

/// Seeded artists
pub fn artists() -> Vec<Artist> {
    vec![
        artist(1, "Led Zeppelin", false),
        artist(2, "Eagles", false),
        artist(3, "The Beatles", false),
        artist(4, "Queen", false),
        artist(5, "The Rolling Stones", false),
        artist(6, "Nazareth", false),
        artist(7, "Derek and the Dominos", false),
        artist(8, "David Essex", true),
        artist(9, "Pink Floyd", false),
    ]
}

/// Seeded songs
pub fn songs() -> Vec<Song> {
    vec![
        song(1, "Whole Lotta Love", (1969, 11, 7), 1),
        song(2, "Stairway to Heaven", (1971, 11, 8), 1),
        song(3, "Rock On", (1973, 11, 2), 8),
        song(4, "Hey Jude", (1968, 8, 26), 3),
        song(5, "Kashmir", (1975, 2, 24), 1),
        song(6, "Fool in the Rain", (1979, 12, 7), 1),
        song(7, "Hotel California", (1977, 2, 22), 2),
        song(8, "Yesterday", (1965, 9, 13), 3),
        song(9, "Bohemian Rhapsody", (1975, 10, 31), 4),
        song(10, "Angie", (1973, 8, 20), 5),
        song(11, "Love Hurts", (1975, 10, 13), 6),
        song(12, "Layla", (1970, 11, 9), 7),
        song(13, "Paint It Black", (1966, 5, 7), 5),
        song(14, "Help!", (1965, 7, 19), 3),
        song(15, "Money", (1973, 6, 27), 9),
        song(16, "One of These Nights", (1975, 5, 19), 2),
    ]
}
