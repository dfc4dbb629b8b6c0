//! Cadence Access
//!
//! Scoped access to user-granted external folders.
//!
//! - [`Locator`]: opaque bytes persisted per root (and per imported song) that re-open access
//! - [`LocatorResolver`]: creates/resolves locators and opens/closes scopes
//! - [`LocatorStore`]: injectable key-value store of root locators
//! - [`AccessScopeManager`]: caches one [`AccessHandle`] per source for the length of a batch
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_access::{AccessScopeManager, FsLocatorResolver, MemoryLocatorStore};
//! use std::sync::Arc;
//!
//! # async fn example(pool: sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = AccessScopeManager::new(
//!     pool,
//!     Arc::new(FsLocatorResolver::default()),
//!     Arc::new(MemoryLocatorStore::new()),
//! );
//!
//! let batch = manager.batch();
//! let root = batch.resolve(1).await?;
//! println!("scanning {}", root.path().display());
//! // scope closes when `batch` and `root` go out of scope
//! # Ok(())
//! # }
//! ```

mod error;
mod locator;
mod scope;
mod store;

pub use error::{AccessError, Result};
pub use locator::{FsLocatorResolver, Locator, LocatorResolver, ResolvedLocator};
pub use scope::{AccessBatch, AccessHandle, AccessScopeManager};
pub use store::{FileLocatorStore, LocatorStore, MemoryLocatorStore};
