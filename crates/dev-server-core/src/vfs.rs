//! The filesystem boundary this crate consumes.
//!
//! Grounded on `turbo-tasks-fs`'s `DirectoryEntry`/`FileSystemEntryType` shapes,
//! but without the `Vc` cell wrapper: every route resolution here is a plain
//! synchronous (or future-returning) call against a project's already-loaded
//! virtual filesystem, not a cached node in an incremental compute graph.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

/// An absolute, `/`-rooted path into the virtual filesystem.
///
/// The only persistent key into storage; two `VirtualPath`s are equal iff
/// their normalized string forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath(String);

impl VirtualPath {
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        VirtualPath(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn join(&self, segment: &str) -> VirtualPath {
        if self.0 == "/" {
            VirtualPath::new(format!("/{segment}"))
        } else {
            VirtualPath::new(format!("{}/{}", self.0, segment))
        }
    }

    /// Returns `self` relative to `root`, without a leading slash, if `self`
    /// is under `root`. Mirrors `FileSystemPath::get_path_to`.
    pub fn strip_root<'a>(&'a self, root: &VirtualPath) -> Option<&'a str> {
        if self.0 == root.0 {
            return Some("");
        }
        let prefix = if root.0 == "/" {
            "/".to_string()
        } else {
            format!("{}/", root.0)
        };
        self.0.strip_prefix(&prefix)
    }

    pub fn file_stem(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        Some(name.split('.').next().unwrap_or(name))
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        name.split_once('.').map(|(_, ext)| ext)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VirtualPath {
    fn from(value: &str) -> Self {
        VirtualPath::new(value)
    }
}

impl From<String> for VirtualPath {
    fn from(value: String) -> Self {
        VirtualPath::new(value)
    }
}

/// One entry in a directory listing.
///
/// Mirrors `turbo_tasks_fs::DirectoryEntry`, minus the `Symlink`/`Other`/`Error`
/// variants this crate has no use for -- a dev server resolving routes only
/// ever needs to distinguish files from directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry {
    File(VirtualPath),
    Directory(VirtualPath),
}

impl DirectoryEntry {
    pub fn path(&self) -> &VirtualPath {
        match self {
            DirectoryEntry::File(p) | DirectoryEntry::Directory(p) => p,
        }
    }
}

/// A subscription handle returned by [`Vfs::watch`]. Dropping it, or calling
/// [`WatchHandle::close`], detaches the underlying watcher.
pub trait WatchHandle: Send + Sync {
    fn close(&self);
}

/// The filesystem interface the core consumes. No method here is allowed to
/// assume a particular backing store -- an in-memory fixture tree
/// ([`crate::testing::MemoryVfs`]) and a real browser-hosted VFS both
/// implement this trait identically.
#[async_trait]
pub trait Vfs: Send + Sync {
    async fn exists(&self, path: &VirtualPath) -> bool;
    async fn is_directory(&self, path: &VirtualPath) -> bool;
    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<DirectoryEntry>>;
    async fn read_file(&self, path: &VirtualPath) -> Result<String>;

    /// Attaches a recursive watcher rooted at `path`. `on_change` is invoked
    /// with the changed file's path for every create/modify/delete event
    /// under the tree. Returns `None` if the tree does not exist.
    fn watch(
        &self,
        path: &VirtualPath,
        on_change: Box<dyn Fn(VirtualPath) + Send + Sync>,
    ) -> Result<Box<dyn WatchHandle>>;
}

/// Tries each extension in order against `<dir>/<name><ext>`, returning the
/// first path that exists as a file. Used throughout the route resolver so
/// that `page_extensions` ordering (configured, not hardcoded) is honored.
pub async fn first_existing_file(
    vfs: &dyn Vfs,
    dir: &VirtualPath,
    name: &str,
    extensions: &[String],
) -> Option<VirtualPath> {
    for ext in extensions {
        let candidate = dir.join(&format!("{name}.{ext}"));
        if vfs.exists(&candidate).await && !vfs.is_directory(&candidate).await {
            return Some(candidate);
        }
    }
    None
}
