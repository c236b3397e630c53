//! The remote service boundary.
//!
//! Four traits cover the two sides of the system: the naming server exposes
//! [`Service`] to clients and [`Registration`] to storage servers; each
//! storage server exposes [`Storage`] (byte I/O) to clients and [`Command`]
//! (file management) to the naming server. A stub is an `Arc<dyn Trait>`
//! handle: in-process deployments hand out the server object itself, and an
//! RPC transport may substitute a remote proxy without either side noticing.

use std::sync::Arc;

use crate::error::Result;
use crate::path::WeftPath;

/// Handle to a storage server's byte-I/O interface.
pub type StorageStub = Arc<dyn Storage>;

/// Handle to a storage server's file-management interface.
pub type CommandStub = Arc<dyn Command>;

/// Client-facing interface of the naming server.
///
/// Routine reads (`is_directory`, `list`, `get_storage`) take no tree locks
/// themselves: the caller is expected to hold a lock on the path, acquired
/// through `lock`, for the duration of its use of the result.
pub trait Service: Send + Sync {
    /// Lock a path for shared (read) or exclusive (write) access.
    ///
    /// Every ancestor of the path is locked in shared mode, root first, then
    /// the target in the requested mode. The call blocks until all locks are
    /// held. Locks stay held until the matching `unlock`, which may arrive on
    /// a different handler thread.
    fn lock(&self, path: &WeftPath, exclusive: bool) -> Result<()>;

    /// Release a lock taken by `lock` with the same mode. Unlocking a path
    /// that is not held in the stated mode is an argument error.
    fn unlock(&self, path: &WeftPath, exclusive: bool) -> Result<()>;

    /// Whether the path names a directory. Not-found if it names nothing.
    fn is_directory(&self, path: &WeftPath) -> Result<bool>;

    /// Child names of a directory, in unspecified order.
    fn list(&self, directory: &WeftPath) -> Result<Vec<String>>;

    /// Create an empty file on some storage server and record it in the
    /// tree. False if the path is the root or already exists.
    fn create_file(&self, path: &WeftPath) -> Result<bool>;

    /// Create a directory node. False if the path is the root or already
    /// exists. No storage server is involved.
    fn create_directory(&self, path: &WeftPath) -> Result<bool>;

    /// Remove a file or directory subtree from the tree and from every
    /// storage server hosting any part of it.
    fn delete(&self, path: &WeftPath) -> Result<bool>;

    /// The storage stub serving a file's primary replica.
    fn get_storage(&self, path: &WeftPath) -> Result<StorageStub>;
}

/// Storage-facing interface of the naming server.
pub trait Registration: Send + Sync {
    /// Announce a storage server and the files it already hosts.
    ///
    /// Returns the announced paths that already exist in the tree; the
    /// caller must delete those from its local root so each file keeps a
    /// single replica. Registering a stub twice is a state error.
    fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<WeftPath>,
    ) -> Result<Vec<WeftPath>>;
}

/// Client-facing byte I/O of a storage server.
pub trait Storage: Send + Sync {
    /// Size of a file in bytes. Not-found for directories and missing paths.
    fn size(&self, path: &WeftPath) -> Result<u64>;

    /// Read exactly `length` bytes at `offset`. Out-of-range if the range
    /// extends past the end of the file.
    fn read(&self, path: &WeftPath, offset: u64, length: usize) -> Result<Vec<u8>>;

    /// Write `data` at `offset`, extending the file if needed. The file must
    /// already exist.
    fn write(&self, path: &WeftPath, offset: u64, data: &[u8]) -> Result<()>;
}

/// Naming-facing file management of a storage server.
pub trait Command: Send + Sync {
    /// Create an empty file, creating missing ancestor directories. False if
    /// the path is the root or the file already exists.
    fn create(&self, path: &WeftPath) -> Result<bool>;

    /// Recursively delete a file or directory subtree, then prune empty
    /// ancestor directories up to (not including) the root.
    fn delete(&self, path: &WeftPath) -> Result<bool>;

    /// Pull a file's bytes from another storage server, replacing any local
    /// copy.
    fn copy(&self, path: &WeftPath, source: &StorageStub) -> Result<bool>;
}
