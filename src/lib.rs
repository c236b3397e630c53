//! weft: a small distributed filesystem.
//!
//! One naming server owns the directory tree metadata; any number of storage
//! servers host file contents under local root directories. Clients resolve
//! and lock paths through the naming server, then move bytes directly
//! against a storage server. Frequently-read files are replicated to more
//! servers; a write collapses a file back to its primary replica.

pub mod api;
pub mod config;
pub mod error;
pub mod naming;
pub mod path;
pub mod storage;

pub use error::{Result, WeftError};
pub use naming::NamingServer;
pub use path::WeftPath;
pub use storage::StorageServer;
