//! The storage server: file contents under a fixed local root, plus the
//! registration handshake with the naming server.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::{Command, CommandStub, Registration, Storage, StorageStub};
use crate::error::{Result, WeftError};
use crate::path::WeftPath;

/// Bytes pulled per round trip during an inter-server copy.
const COPY_CHUNK: u64 = 64 * 1024;

/// Notification hook invoked when the server shuts down. The error is the
/// fatal cause, or `None` for an explicit stop.
pub type StoppedHook = Box<dyn Fn(Option<&WeftError>) + Send + Sync>;

/// A storage server rooted at a local directory.
///
/// Implements [`Storage`] for clients and [`Command`] for the naming server.
/// Every operation holds the host-level guard, so local file I/O on one host
/// is fully serialized; cross-client ordering is the naming server's job.
pub struct StorageServer {
    root: PathBuf,
    io: Mutex<()>,
    started: AtomicBool,
    on_stopped: Mutex<Option<StoppedHook>>,
}

impl StorageServer {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            io: Mutex::new(()),
            started: AtomicBool::new(false),
            on_stopped: Mutex::new(None),
        })
    }

    /// Local directory this server serves from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Install the shutdown notification hook. The default is silent.
    pub fn on_stopped(&self, hook: StoppedHook) {
        *self.on_stopped.lock() = Some(hook);
    }

    /// Register with a naming server and reconcile local files.
    ///
    /// Announces every file under the local root; the naming server returns
    /// the paths that already exist elsewhere, and those are deleted locally
    /// so each file keeps a single replica across the system.
    pub fn start(self: &Arc<Self>, naming: &dyn Registration) -> Result<()> {
        let meta = fs::metadata(&self.root)
            .map_err(|_| WeftError::NotFound(self.root.display().to_string()))?;
        if !meta.is_dir() {
            return Err(WeftError::NotFound(self.root.display().to_string()));
        }

        let files = local_files(&self.root)?;
        info!(
            "storage server at {} announcing {} files",
            self.root.display(),
            files.len()
        );
        let storage: StorageStub = Arc::clone(self) as StorageStub;
        let command: CommandStub = Arc::clone(self) as CommandStub;
        let duplicates = naming.register(storage, command, files)?;
        for path in &duplicates {
            debug!("dropping duplicate {}", path);
            self.delete_local(path);
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the server and fire the stopped hook. Not restartable.
    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
        info!("storage server at {} stopped", self.root.display());
        if let Some(hook) = self.on_stopped.lock().as_ref() {
            hook(None);
        }
    }

    fn local(&self, path: &WeftPath) -> PathBuf {
        path.to_local(&self.root)
    }

    fn size_local(&self, path: &WeftPath) -> Result<u64> {
        let target = self.local(path);
        match fs::metadata(&target) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(WeftError::NotFound(path.to_string())),
        }
    }

    fn read_local(&self, path: &WeftPath, offset: u64, length: usize) -> Result<Vec<u8>> {
        let size = self.size_local(path)?;
        let end = offset.checked_add(length as u64);
        match end {
            Some(end) if end <= size => {}
            _ => {
                return Err(WeftError::OutOfRange {
                    offset,
                    length: length as u64,
                    size,
                })
            }
        }
        let mut file = File::open(self.local(path))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; length];
        file.read_exact(&mut data)?;
        Ok(data)
    }

    fn write_local(&self, path: &WeftPath, offset: u64, data: &[u8]) -> Result<()> {
        // Existence and kind checks first: opening for write would otherwise
        // report a bare IO error for a directory target.
        self.size_local(path)?;
        let mut file = OpenOptions::new().write(true).open(self.local(path))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn create_local(&self, path: &WeftPath) -> bool {
        if path.is_root() {
            return false;
        }
        let target = self.local(path);
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("creating ancestors of {}: {}", path, e);
                return false;
            }
        }
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
            Err(e) => {
                warn!("creating {}: {}", path, e);
                false
            }
        }
    }

    fn delete_local(&self, path: &WeftPath) -> bool {
        if path.is_root() {
            return false;
        }
        let target = self.local(path);
        if !remove_tree(&target) {
            return false;
        }
        // Prune now-empty ancestors, stopping at the first occupied
        // directory or the root.
        let mut dir = target.parent().map(Path::to_path_buf);
        while let Some(current) = dir {
            if current == self.root || !dir_is_empty(&current) {
                break;
            }
            if fs::remove_dir(&current).is_err() {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        true
    }

    fn copy_local(&self, path: &WeftPath, source: &StorageStub) -> Result<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let size = source.size(path)?;
        self.delete_local(path);
        self.create_local(path);
        let mut offset = 0u64;
        while offset < size {
            let chunk = (size - offset).min(COPY_CHUNK) as usize;
            let data = source.read(path, offset, chunk)?;
            if data.is_empty() {
                return Err(WeftError::Remote(format!(
                    "source returned no data for {} at offset {}",
                    path, offset
                )));
            }
            self.write_local(path, offset, &data)?;
            offset += data.len() as u64;
        }
        debug!("pulled {} ({} bytes)", path, size);
        Ok(true)
    }
}

impl Storage for StorageServer {
    fn size(&self, path: &WeftPath) -> Result<u64> {
        let _io = self.io.lock();
        self.size_local(path)
    }

    fn read(&self, path: &WeftPath, offset: u64, length: usize) -> Result<Vec<u8>> {
        let _io = self.io.lock();
        self.read_local(path, offset, length)
    }

    fn write(&self, path: &WeftPath, offset: u64, data: &[u8]) -> Result<()> {
        let _io = self.io.lock();
        self.write_local(path, offset, data)
    }
}

impl Command for StorageServer {
    fn create(&self, path: &WeftPath) -> Result<bool> {
        let _io = self.io.lock();
        Ok(self.create_local(path))
    }

    fn delete(&self, path: &WeftPath) -> Result<bool> {
        let _io = self.io.lock();
        Ok(self.delete_local(path))
    }

    fn copy(&self, path: &WeftPath, source: &StorageStub) -> Result<bool> {
        let _io = self.io.lock();
        self.copy_local(path, source)
    }
}

/// Remove a file or a directory subtree. False if anything could not be
/// removed, including a target that does not exist.
fn remove_tree(target: &Path) -> bool {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target).is_ok(),
        Ok(_) => fs::remove_file(target).is_ok(),
        Err(_) => false,
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    }
}

/// Relative paths of every regular file under `root`, for the registration
/// announcement.
fn local_files(root: &Path) -> Result<Vec<WeftPath>> {
    fn walk(dir: &Path, at: &WeftPath, out: &mut Vec<WeftPath>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().into_string().map_err(|name| {
                WeftError::Argument(format!("file name {:?} is not valid UTF-8", name))
            })?;
            let sub = at.child(&name)?;
            if entry.file_type()?.is_dir() {
                walk(&entry.path(), &sub, out)?;
            } else {
                out.push(sub);
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, &WeftPath::root(), &mut out)?;
    Ok(out)
}
