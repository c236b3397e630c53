//! The naming server: directory tree metadata, hierarchical locking, and the
//! read-replication / write-invalidation policy.

mod node;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::api::{CommandStub, Registration, Service, StorageStub};
use crate::error::{Result, WeftError};
use crate::path::WeftPath;

use self::node::FsNode;

/// Shared locks of a file between replications. The 20th consecutive read
/// lock triggers a copy to one more server.
const REPLICATION_THRESHOLD: u32 = 20;

/// Child map of a node already resolved as a directory by `find_expect`.
/// Node kinds never change, so a miss here is an internal invariant breach,
/// not a lookup failure.
fn children_of<'n>(
    node: &'n FsNode,
    path: &WeftPath,
) -> Result<&'n DashMap<String, Arc<FsNode>>> {
    node.children()
        .ok_or_else(|| WeftError::State(format!("{} is not a directory", path)))
}

struct RegisteredServer {
    storage: StorageStub,
    command: CommandStub,
}

/// Append-only list of registered storage servers. A file node's replica
/// indices always point into this list, and an index refers to the same
/// server for the life of the process.
struct StorageRegistry {
    entries: RwLock<Vec<RegisteredServer>>,
}

impl StorageRegistry {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Append a stub pair, refusing a stub that is already present. The
    /// duplicate check and the append are atomic under the write lock.
    fn register(&self, storage: StorageStub, command: CommandStub) -> Result<usize> {
        let mut entries = self.entries.write();
        let duplicate = entries.iter().any(|entry| {
            Arc::ptr_eq(&entry.storage, &storage) || Arc::ptr_eq(&entry.command, &command)
        });
        if duplicate {
            return Err(WeftError::State(
                "storage server stub already registered".to_string(),
            ));
        }
        let index = entries.len();
        entries.push(RegisteredServer { storage, command });
        Ok(index)
    }

    fn storage(&self, index: usize) -> Result<StorageStub> {
        self.entries
            .read()
            .get(index)
            .map(|entry| Arc::clone(&entry.storage))
            .ok_or_else(|| WeftError::State(format!("replica index {} out of range", index)))
    }

    fn command(&self, index: usize) -> Result<CommandStub> {
        self.entries
            .read()
            .get(index)
            .map(|entry| Arc::clone(&entry.command))
            .ok_or_else(|| WeftError::State(format!("replica index {} out of range", index)))
    }
}

/// The naming server.
///
/// Owns the directory tree and the storage registry; stores no file bytes.
/// Exposes [`Service`] to clients and [`Registration`] to storage servers.
/// The tree lives in process memory only and is rebuilt from registrations
/// on restart.
pub struct NamingServer {
    root: Arc<FsNode>,
    registry: StorageRegistry,
    /// Round-robin cursor for placing newly created files.
    next_create: AtomicUsize,
}

impl NamingServer {
    pub fn new() -> Self {
        Self {
            root: FsNode::new_directory(),
            registry: StorageRegistry::new(),
            next_create: AtomicUsize::new(0),
        }
    }

    /// Number of registered storage servers.
    pub fn server_count(&self) -> usize {
        self.registry.len()
    }

    /// Read-side replication step, run after a shared lock of a file is
    /// acquired. The state mutex stays held across the copy command, so
    /// concurrent readers of the same file serialize on the policy.
    fn count_read(&self, path: &WeftPath, state: &parking_lot::Mutex<node::FileState>) -> Result<()> {
        let mut state = state.lock();
        state.read_count += 1;
        if state.read_count < REPLICATION_THRESHOLD {
            return Ok(());
        }
        state.read_count = 0;

        // Replica indices equal registration order and the write path only
        // ever truncates back to the primary, so the next unused index is
        // the current replica count.
        let candidate = state.replicas.len();
        if candidate >= self.registry.len() {
            return Ok(());
        }
        let primary = state
            .replicas
            .first()
            .copied()
            .ok_or_else(|| WeftError::State(format!("file {} has no replicas", path)))?;
        let source = self.registry.storage(primary)?;
        let copied = self
            .registry
            .command(candidate)?
            .copy(path, &source)
            .map_err(|e| {
                WeftError::Remote(format!("replicating {} to server {}: {}", path, candidate, e))
            })?;
        if copied {
            state.replicas.push(candidate);
            debug!("replicated {} to server {}", path, candidate);
        }
        Ok(())
    }

    /// Write-side invalidation step, run after an exclusive lock of a file
    /// is acquired: every replica but the primary is deleted remotely.
    fn invalidate_replicas(
        &self,
        path: &WeftPath,
        state: &parking_lot::Mutex<node::FileState>,
    ) -> Result<()> {
        let mut state = state.lock();
        let primary = state
            .replicas
            .first()
            .copied()
            .ok_or_else(|| WeftError::State(format!("file {} has no replicas", path)))?;
        for &index in state.replicas.iter().skip(1) {
            if index == primary {
                continue;
            }
            let deleted = self
                .registry
                .command(index)?
                .delete(path)
                .map_err(|e| {
                    WeftError::Remote(format!("invalidating {} on server {}: {}", path, index, e))
                })?;
            if !deleted {
                return Err(WeftError::State(format!(
                    "server {} failed to delete its replica of {}",
                    index, path
                )));
            }
            debug!("invalidated replica of {} on server {}", path, index);
        }
        state.replicas.truncate(1);
        state.read_count = 0;
        Ok(())
    }
}

impl Default for NamingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for NamingServer {
    fn lock(&self, path: &WeftPath, exclusive: bool) -> Result<()> {
        let node = self.root.find(path)?;
        // Ancestors first, root to parent, all shared. Every client walks in
        // this order, so acquisition order matches the tree's partial order.
        if let Some(parent) = path.parent() {
            self.lock(&parent, false)?;
        }
        node.lock(exclusive);
        if let Some(state) = node.file_state() {
            if exclusive {
                self.invalidate_replicas(path, state)?;
            } else {
                self.count_read(path, state)?;
            }
        }
        Ok(())
    }

    fn unlock(&self, path: &WeftPath, exclusive: bool) -> Result<()> {
        let node = self
            .root
            .find(path)
            .map_err(|_| WeftError::Argument(format!("unlock of unknown path {}", path)))?;
        // Target first, then ancestors up to the root.
        node.unlock(exclusive)?;
        if let Some(parent) = path.parent() {
            self.unlock(&parent, false)?;
        }
        Ok(())
    }

    fn is_directory(&self, path: &WeftPath) -> Result<bool> {
        Ok(self.root.find(path)?.is_directory())
    }

    fn list(&self, directory: &WeftPath) -> Result<Vec<String>> {
        Ok(self.root.find_expect(directory, true)?.child_names())
    }

    fn create_file(&self, path: &WeftPath) -> Result<bool> {
        let (Some(parent_path), Some(name)) = (path.parent(), path.last()) else {
            return Ok(false);
        };
        let _tree = self.root.guard(false);
        let parent = self.root.find_expect(&parent_path, true)?;
        let children = children_of(&parent, &parent_path)?;
        let result = match children.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let server_count = self.registry.len();
                if server_count == 0 {
                    return Err(WeftError::State(
                        "no storage servers registered".to_string(),
                    ));
                }
                let index = self.next_create.fetch_add(1, Ordering::Relaxed) % server_count;
                self.registry.command(index)?.create(path).map_err(|e| {
                    WeftError::Remote(format!("creating {} on server {}: {}", path, index, e))
                })?;
                slot.insert(FsNode::new_file(index));
                debug!("created file {} on server {}", path, index);
                Ok(true)
            }
        };
        result
    }

    fn create_directory(&self, path: &WeftPath) -> Result<bool> {
        let (Some(parent_path), Some(name)) = (path.parent(), path.last()) else {
            return Ok(false);
        };
        let _tree = self.root.guard(false);
        let parent = self.root.find_expect(&parent_path, true)?;
        let children = children_of(&parent, &parent_path)?;
        let result = match children.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(FsNode::new_directory());
                debug!("created directory {}", path);
                Ok(true)
            }
        };
        result
    }

    fn delete(&self, path: &WeftPath) -> Result<bool> {
        let (Some(parent_path), Some(name)) = (path.parent(), path.last()) else {
            return Ok(false);
        };
        let _tree = self.root.guard(false);
        let parent = self.root.find_expect(&parent_path, true)?;
        let children = children_of(&parent, &parent_path)?;
        let node = parent
            .find_child(name)
            .map_err(|_| WeftError::NotFound(path.to_string()))?;

        // Every server hosting any file in the subtree is told to delete
        // the whole path; its local pruning removes what it holds of it.
        let mut replicas = BTreeSet::new();
        node.each_file(&mut |file| {
            if let Some(state) = file.file_state() {
                replicas.extend(state.lock().replicas.iter().copied());
            }
        });

        let mut all_deleted = true;
        for index in replicas {
            let deleted = self
                .registry
                .command(index)?
                .delete(path)
                .map_err(|e| {
                    WeftError::Remote(format!("deleting {} on server {}: {}", path, index, e))
                })?;
            all_deleted = all_deleted && deleted;
        }
        children.remove(name);
        debug!("deleted {}", path);
        Ok(all_deleted)
    }

    fn get_storage(&self, path: &WeftPath) -> Result<StorageStub> {
        let node = self.root.find_expect(path, false)?;
        let primary = node
            .primary_replica()
            .ok_or_else(|| WeftError::State(format!("file {} has no replicas", path)))?;
        self.registry.storage(primary)
    }
}

impl Registration for NamingServer {
    fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<WeftPath>,
    ) -> Result<Vec<WeftPath>> {
        // Registration edits arbitrary parts of the tree, so it holds the
        // root exclusive; structural mutations hold it shared and are thereby
        // suspended for the duration.
        let _tree = self.root.guard(true);
        let index = self.registry.register(storage, command)?;
        info!(
            "registered storage server {} announcing {} files",
            index,
            files.len()
        );

        let mut duplicates = Vec::new();
        'files: for path in &files {
            let (Some(parent_path), Some(name)) = (path.parent(), path.last()) else {
                continue;
            };
            let mut node = Arc::clone(&self.root);
            for component in parent_path.components() {
                let next = match node.children() {
                    Some(children) => Arc::clone(
                        children
                            .entry(component.to_string())
                            .or_insert_with(FsNode::new_directory)
                            .value(),
                    ),
                    // An interior component is already a file on some other
                    // server; the announced path cannot be entered.
                    None => {
                        duplicates.push(path.clone());
                        continue 'files;
                    }
                };
                node = next;
            }
            match node.children() {
                None => duplicates.push(path.clone()),
                Some(children) => match children.entry(name.to_string()) {
                    Entry::Occupied(_) => duplicates.push(path.clone()),
                    Entry::Vacant(slot) => {
                        slot.insert(FsNode::new_file(index));
                    }
                },
            }
        }
        Ok(duplicates)
    }
}
