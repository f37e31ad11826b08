//! In-memory mock filesystem for testing collectors without real `/proc`.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Tree {
    files: HashMap<PathBuf, String>,
    links: HashMap<PathBuf, PathBuf>,
    directories: HashSet<PathBuf>,
}

impl Tree {
    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

/// In-memory filesystem for testing.
///
/// Clones share the same tree, so a test can keep a handle and rewrite
/// `/proc/stat` between two collections.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    tree: Arc<RwLock<Tree>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file. Parent directories are created.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        tree.add_parents(&path);
        tree.files.insert(path, content.into());
    }

    /// Adds a symbolic link pointing at `target`.
    pub fn add_link(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        tree.add_parents(&path);
        tree.links.insert(path, target.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        tree.add_parents(&path);
        tree.directories.insert(path);
    }

    /// Removes a path and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        tree.files.retain(|p, _| !p.starts_with(path));
        tree.links.retain(|p, _| !p.starts_with(path));
        tree.directories.retain(|p| !p.starts_with(path));
    }

    /// Adds a process with its `/proc/[pid]/` files.
    ///
    /// `cwd` and `exe` become links; pass an empty string to leave one out
    /// (as for kernel threads or processes owned by another user).
    pub fn add_process(
        &self,
        pid: u32,
        stat: &str,
        status: &str,
        cmdline: &str,
        cwd: &str,
        exe: &str,
    ) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("status"), status);
        self.add_file(base.join("cmdline"), cmdline);
        if !cwd.is_empty() {
            self.add_link(base.join("cwd"), cwd);
        }
        if !exe.is_empty() {
            self.add_link(base.join("exe"), exe);
        }
    }
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found: {:?}", what, path),
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let tree = self.tree.read().unwrap_or_else(|e| e.into_inner());
        tree.files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found("file", path))
    }

    fn exists(&self, path: &Path) -> bool {
        let tree = self.tree.read().unwrap_or_else(|e| e.into_inner());
        tree.files.contains_key(path)
            || tree.links.contains_key(path)
            || tree.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let tree = self.tree.read().unwrap_or_else(|e| e.into_inner());
        if !tree.directories.contains(path) {
            return Err(not_found("directory", path));
        }

        let is_child = |p: &PathBuf| p.parent().is_some_and(|parent| parent == path);
        let mut entries: HashSet<PathBuf> = HashSet::new();
        entries.extend(tree.files.keys().filter(|p| is_child(p)).cloned());
        entries.extend(tree.links.keys().filter(|p| is_child(p)).cloned());
        entries.extend(
            tree.directories
                .iter()
                .filter(|p| is_child(p) && p.as_path() != path)
                .cloned(),
        );

        let mut entries: Vec<PathBuf> = entries.into_iter().collect();
        entries.sort();
        Ok(entries)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let tree = self.tree.read().unwrap_or_else(|e| e.into_inner());
        match tree.links.get(path) {
            Some(target) => Ok(target.clone()),
            None if tree.files.contains_key(path) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a link: {:?}", path),
            )),
            None => Err(not_found("link", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal: 16384 kB\n");

        assert!(fs.exists(Path::new("/proc/meminfo")));
        assert!(fs.exists(Path::new("/proc")));
        let content = fs.read_to_string(Path::new("/proc/meminfo")).unwrap();
        assert_eq!(content, "MemTotal: 16384 kB\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let fs = MockFs::new();
        fs.add_file("/proc/1/stat", "stat content");
        fs.add_file("/proc/1/status", "status content");
        fs.add_link("/proc/1/cwd", "/");
        fs.add_file("/proc/2/stat", "stat content 2");

        let proc_entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(
            proc_entries,
            vec![PathBuf::from("/proc/1"), PathBuf::from("/proc/2")]
        );
        assert_eq!(fs.read_dir(Path::new("/proc/1")).unwrap().len(), 3);
    }

    #[test]
    fn test_mock_fs_links() {
        let fs = MockFs::new();
        fs.add_link("/proc/7/exe", "/usr/bin/python3");
        fs.add_file("/proc/7/stat", "x");

        assert_eq!(
            fs.read_link(Path::new("/proc/7/exe")).unwrap(),
            PathBuf::from("/usr/bin/python3")
        );
        let err = fs.read_link(Path::new("/proc/7/stat")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = fs.read_link(Path::new("/proc/7/cwd")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_fs_remove_and_shared_clone() {
        let fs = MockFs::new();
        let handle = fs.clone();
        fs.add_process(42, "stat", "status", "", "/tmp", "/bin/sleep");

        handle.remove("/proc/42");
        assert!(!fs.exists(Path::new("/proc/42")));
        assert!(!fs.exists(Path::new("/proc/42/exe")));
        assert!(fs.exists(Path::new("/proc")));
    }
}
