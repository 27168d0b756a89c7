//! The "Hits" music catalog: artists and their songs

pub mod artist;
pub mod context;
pub mod song;

pub use artist::Artist;
pub use context::HitsContext;
pub use song::Song;

use crate::core::service::CrudService;

pub type ArtistService = CrudService<HitsContext, Artist>;
pub type SongService = CrudService<HitsContext, Song>;
