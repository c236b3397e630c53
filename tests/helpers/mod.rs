use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use weft::{NamingServer, StorageServer};

/// An in-process cluster: one naming server plus a storage server per temp
/// directory. Servers hand their own `Arc` to the naming server as stubs,
/// exactly as an RPC transport would hand out remote proxies.
pub struct TestCluster {
    pub naming: Arc<NamingServer>,
    pub servers: Vec<Arc<StorageServer>>,
    pub roots: Vec<TempDir>,
}

impl TestCluster {
    /// A cluster with `n` empty storage roots. Servers are not started, so
    /// tests can seed files first.
    pub fn new(n: usize) -> Self {
        let roots: Vec<TempDir> = (0..n)
            .map(|_| tempfile::tempdir().expect("create storage root"))
            .collect();
        let servers = roots
            .iter()
            .map(|root| StorageServer::new(root.path()))
            .collect();
        TestCluster {
            naming: Arc::new(NamingServer::new()),
            servers,
            roots,
        }
    }

    /// Write a file under a storage root, typically before the server starts.
    pub fn seed(&self, server: usize, rel: &str, contents: &[u8]) {
        let target = self.roots[server].path().join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("create seed ancestors");
        }
        fs::write(target, contents).expect("write seed file");
    }

    /// Start every storage server, in index order.
    pub fn start_all(&self) {
        for server in &self.servers {
            server
                .start(self.naming.as_ref())
                .expect("start storage server");
        }
    }

    /// Local path of `rel` under a server's root.
    pub fn local(&self, server: usize, rel: &str) -> PathBuf {
        self.roots[server].path().join(rel)
    }
}
