use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::error::{Result, WeftError};
use crate::path::WeftPath;

/// Replica bookkeeping for a file node. Mutated only while the node's
/// [`NodeLock`] is held by the caller; the mutex serializes concurrent
/// shared holders.
#[derive(Debug)]
pub(crate) struct FileState {
    /// Indices into the storage registry. Element 0 is the primary and the
    /// list is never empty while the node is reachable.
    pub replicas: Vec<usize>,
    /// Shared-lock acquisitions since the last replication or invalidation.
    pub read_count: u32,
}

enum NodeKind {
    Directory {
        children: DashMap<String, Arc<FsNode>>,
    },
    File {
        state: Mutex<FileState>,
    },
}

/// One node of the naming tree: a directory with children or a file with
/// replicas, plus the node's own reader/writer lock.
pub(crate) struct FsNode {
    lock: NodeLock,
    kind: NodeKind,
}

impl FsNode {
    pub fn new_directory() -> Arc<Self> {
        Arc::new(Self {
            lock: NodeLock::new(),
            kind: NodeKind::Directory {
                children: DashMap::new(),
            },
        })
    }

    pub fn new_file(primary: usize) -> Arc<Self> {
        Arc::new(Self {
            lock: NodeLock::new(),
            kind: NodeKind::File {
                state: Mutex::new(FileState {
                    replicas: vec![primary],
                    read_count: 0,
                }),
            },
        })
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn file_state(&self) -> Option<&Mutex<FileState>> {
        match &self.kind {
            NodeKind::File { state } => Some(state),
            NodeKind::Directory { .. } => None,
        }
    }

    /// The primary replica index of a file node. `None` for directories and
    /// for a file whose replica list has been emptied.
    pub fn primary_replica(&self) -> Option<usize> {
        self.file_state()
            .and_then(|state| state.lock().replicas.first().copied())
    }

    /// The child map of a directory node, `None` on file nodes.
    pub fn children(&self) -> Option<&DashMap<String, Arc<FsNode>>> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    /// Names of a directory's children, in unspecified order.
    pub fn child_names(&self) -> Vec<String> {
        match &self.kind {
            NodeKind::Directory { children } => {
                children.iter().map(|child| child.key().clone()).collect()
            }
            NodeKind::File { .. } => Vec::new(),
        }
    }

    /// The named child of a directory. Not-found on file nodes and missing
    /// names.
    pub fn find_child(&self, name: &str) -> Result<Arc<FsNode>> {
        match &self.kind {
            NodeKind::Directory { children } => children
                .get(name)
                .map(|child| Arc::clone(child.value()))
                .ok_or_else(|| WeftError::NotFound(name.to_string())),
            NodeKind::File { .. } => Err(WeftError::NotFound(name.to_string())),
        }
    }

    /// Resolve a path relative to this node, creating nothing.
    pub fn find(self: &Arc<Self>, path: &WeftPath) -> Result<Arc<FsNode>> {
        let mut node = Arc::clone(self);
        for name in path.components() {
            node = node
                .find_child(name)
                .map_err(|_| WeftError::NotFound(path.to_string()))?;
        }
        Ok(node)
    }

    /// Resolve a path and require the node kind; a mismatch is not-found.
    pub fn find_expect(
        self: &Arc<Self>,
        path: &WeftPath,
        want_directory: bool,
    ) -> Result<Arc<FsNode>> {
        let node = self.find(path)?;
        if node.is_directory() != want_directory {
            return Err(WeftError::NotFound(path.to_string()));
        }
        Ok(node)
    }

    /// Invoke `visit` on every file node in this subtree (this node itself
    /// if it is a file).
    pub fn each_file(&self, visit: &mut dyn FnMut(&FsNode)) {
        match &self.kind {
            NodeKind::Directory { children } => {
                for child in children.iter() {
                    child.value().each_file(visit);
                }
            }
            NodeKind::File { .. } => visit(self),
        }
    }

    /// Block until this node's lock is held in the given mode.
    pub fn lock(&self, exclusive: bool) {
        self.lock.acquire(exclusive);
    }

    /// Release this node's lock. Argument error if the lock is not held in
    /// the stated mode.
    pub fn unlock(&self, exclusive: bool) -> Result<()> {
        self.lock.release(exclusive)
    }

    /// Hold this node's lock for a lexical scope.
    pub fn guard(&self, exclusive: bool) -> NodeGuard<'_> {
        self.lock.acquire(exclusive);
        NodeGuard { lock: &self.lock, exclusive }
    }
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// A counting reader/writer lock with raw acquire/release.
///
/// Lock and unlock arrive as separate service calls, so a lock taken on one
/// handler thread may be released from another; guard-based locks cannot
/// express that. A shared request waits only on a held writer, never a
/// queued one, so a client that already holds an ancestor in shared mode can
/// take further shared locks without deadlocking behind a waiting writer.
pub(crate) struct NodeLock {
    state: Mutex<LockState>,
    ready: Condvar,
}

impl NodeLock {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            ready: Condvar::new(),
        }
    }

    fn acquire(&self, exclusive: bool) {
        let mut state = self.state.lock();
        if exclusive {
            while state.writer || state.readers > 0 {
                self.ready.wait(&mut state);
            }
            state.writer = true;
        } else {
            while state.writer {
                self.ready.wait(&mut state);
            }
            state.readers += 1;
        }
    }

    fn release(&self, exclusive: bool) -> Result<()> {
        let mut state = self.state.lock();
        if exclusive {
            if !state.writer {
                return Err(WeftError::Argument(
                    "unlock of a write lock that is not held".to_string(),
                ));
            }
            state.writer = false;
        } else {
            if state.readers == 0 {
                return Err(WeftError::Argument(
                    "unlock of a read lock that is not held".to_string(),
                ));
            }
            state.readers -= 1;
        }
        self.ready.notify_all();
        Ok(())
    }
}

/// Scoped hold of a [`NodeLock`], used for the tree-wide guards inside
/// structural mutation and registration.
pub(crate) struct NodeGuard<'a> {
    lock: &'a NodeLock,
    exclusive: bool,
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        // Held by construction, so the release cannot mismatch.
        let _ = self.lock.release(self.exclusive);
    }
}
