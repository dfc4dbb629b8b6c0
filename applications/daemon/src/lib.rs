//! Cadence daemon
//!
//! Command-line front end over the Cadence libraries: registers external music folders,
//! syncs and imports them, and runs the background copy service.

pub mod config;
pub mod error;
pub mod library;

pub use config::CadenceConfig;
pub use error::{DaemonError, Result};
pub use library::Library;
