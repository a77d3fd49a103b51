use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::vfs::{DirectoryEntry, VirtualPath, Vfs, WatchHandle};

/// An in-memory filesystem fixture, modeled on `turbo_tasks_fs`'s
/// `DirectoryEntry`/`FileSystemEntryType` shapes but storing everything in a
/// plain `Vec` rather than a cached incremental-compute node.
pub struct MemoryVfs {
    files: Mutex<Vec<(VirtualPath, String)>>,
    watchers: Mutex<Vec<(VirtualPath, Box<dyn Fn(VirtualPath) + Send + Sync>)>>,
}

impl MemoryVfs {
    pub fn new() -> Self {
        MemoryVfs {
            files: Mutex::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn write_file(&self, path: impl Into<String>, contents: impl Into<String>) {
        let path = VirtualPath::new(path.into());
        let contents = contents.into();
        let mut files = self.files.lock().unwrap();
        if let Some(entry) = files.iter_mut().find(|(p, _)| *p == path) {
            entry.1 = contents;
        } else {
            files.push((path.clone(), contents));
        }
        drop(files);
        self.notify(&path);
    }

    fn notify(&self, path: &VirtualPath) {
        let watchers = self.watchers.lock().unwrap();
        for (root, callback) in watchers.iter() {
            if path.strip_root(root).is_some() {
                callback(path.clone());
            }
        }
    }
}

impl Default for MemoryVfs {
    fn default() -> Self {
        MemoryVfs::new()
    }
}

struct NoopWatchHandle;

impl WatchHandle for NoopWatchHandle {
    fn close(&self) {}
}

#[async_trait]
impl Vfs for MemoryVfs {
    async fn exists(&self, path: &VirtualPath) -> bool {
        let files = self.files.lock().unwrap();
        files.iter().any(|(p, _)| p == path) || self.is_directory(path).await
    }

    async fn is_directory(&self, path: &VirtualPath) -> bool {
        let files = self.files.lock().unwrap();
        let prefix = if path.as_str() == "/" {
            "/".to_string()
        } else {
            format!("{}/", path.as_str())
        };
        files.iter().any(|(p, _)| p.as_str().starts_with(&prefix))
    }

    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<DirectoryEntry>> {
        let files = self.files.lock().unwrap();
        let prefix = if path.as_str() == "/" {
            "/".to_string()
        } else {
            format!("{}/", path.as_str())
        };

        let mut seen_dirs = std::collections::BTreeSet::new();
        let mut entries = Vec::new();

        for (file_path, _) in files.iter() {
            let Some(rest) = file_path.as_str().strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((dir_name, _)) => {
                    if seen_dirs.insert(dir_name.to_string()) {
                        entries.push(DirectoryEntry::Directory(
                            VirtualPath::new(format!("{prefix}{dir_name}")),
                        ));
                    }
                }
                None => entries.push(DirectoryEntry::File(file_path.clone())),
            }
        }

        entries.sort_by(|a, b| a.path().as_str().cmp(b.path().as_str()));
        Ok(entries)
    }

    async fn read_file(&self, path: &VirtualPath) -> Result<String> {
        let files = self.files.lock().unwrap();
        files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, contents)| contents.clone())
            .ok_or_else(|| anyhow!("no such file: {path}"))
    }

    fn watch(
        &self,
        path: &VirtualPath,
        on_change: Box<dyn Fn(VirtualPath) + Send + Sync>,
    ) -> Result<Box<dyn WatchHandle>> {
        self.watchers.lock().unwrap().push((path.clone(), on_change));
        Ok(Box::new(NoopWatchHandle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_dir_deduplicates_and_sorts() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/pages/b.jsx", "b");
        vfs.write_file("/pages/a.jsx", "a");
        vfs.write_file("/pages/nested/c.jsx", "c");

        let entries = vfs.read_dir(&VirtualPath::new("/pages")).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.path().as_str().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "/pages/a.jsx".to_string(),
                "/pages/b.jsx".to_string(),
                "/pages/nested".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn watch_notifies_on_write() {
        let vfs = MemoryVfs::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        vfs.watch(
            &VirtualPath::new("/pages"),
            Box::new(move |path| seen2.lock().unwrap().push(path.to_string())),
        )
        .unwrap();

        vfs.write_file("/pages/index.jsx", "hi");
        assert_eq!(*seen.lock().unwrap(), vec!["/pages/index.jsx".to_string()]);
    }
}
