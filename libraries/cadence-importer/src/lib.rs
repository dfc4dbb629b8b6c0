//! Cadence Importer
//!
//! Sync, import and relocation of audio living in user-granted external folders.
//!
//! # Architecture
//!
//! - `scanner`: flat, deduplicated snapshot of a root (audio, other files, directories)
//! - `registry`: source registration and the current-source switch
//! - `indexer`: reconciles a source's path index with a fresh scan
//! - `metadata`: tag extraction through a declarative tag table, with fallbacks
//! - `artwork`: content-addressed cover art store
//! - `importer`: the cancellable import pipeline producing songs
//! - `copy`: background service moving song bytes into app-private storage
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_importer::{indexer::SourceIndexer, registry::SourceRegistry};
//! use cadence_core::SourceType;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     pool: sqlx::SqlitePool,
//! #     access: Arc<cadence_access::AccessScopeManager>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SourceRegistry::new(pool.clone(), access.clone());
//! let source = registry
//!     .register_root("user-1", std::path::Path::new("/music"), SourceType::Folder)
//!     .await?;
//!
//! let report = SourceIndexer::new(pool, access).sync_source(source.id).await?;
//! println!("{} audio files indexed", report.audio_files);
//! # Ok(())
//! # }
//! ```

mod error;
mod types;

pub mod artwork;
pub mod copy;
pub mod importer;
pub mod indexer;
pub mod metadata;
pub mod registry;
pub mod scanner;

pub use error::{CopyError, ImportError, ScanError};
pub use importer::MediaImporter;
pub use types::*;

pub type Result<T> = std::result::Result<T, ImportError>;
