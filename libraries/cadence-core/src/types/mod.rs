mod song;
mod source;
mod source_path;

pub use song::{FileState, Song, SongId, UpsertSong};
pub use source::{Source, SourceId, SourceType};
pub use source_path::{PathSearchResult, RunId, SourcePath, UpsertSourcePath};
