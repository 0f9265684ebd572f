//! OS-directory-backed filesystem rooted at a host path.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{io_error, path, FileKind, Metadata, Vfs, VfsError, VfsResult};

/// Maps virtual absolute paths onto a host directory. `/kernel/apps` with a
/// root of `/srv/sos` resolves to `/srv/sos/kernel/apps`; escapes above the
/// root are removed lexically before touching the host.
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, virtual_path: &str) -> VfsResult<PathBuf> {
        if !path::is_abs(virtual_path) {
            return Err(VfsError::AbsolutePathRequired(virtual_path.to_string()));
        }
        let cleaned = path::clean(virtual_path);
        let mut host = self.root.clone();
        for seg in path::segments(&cleaned) {
            host.push(seg);
        }
        Ok(host)
    }

    fn metadata(name: &str, meta: &fs::Metadata) -> Metadata {
        Metadata {
            name: name.to_string(),
            len: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            kind: if meta.is_dir() {
                FileKind::Dir
            } else {
                FileKind::File
            },
            capability: None,
        }
    }
}

impl Vfs for OsFs {
    fn name(&self) -> &'static str {
        "osfs"
    }

    fn stat(&self, virtual_path: &str) -> VfsResult<Metadata> {
        let host = self.resolve(virtual_path)?;
        let meta = fs::metadata(&host).map_err(|e| io_error(virtual_path, e))?;
        Ok(Self::metadata(path::base(virtual_path), &meta))
    }

    fn read(&self, virtual_path: &str) -> VfsResult<Vec<u8>> {
        let host = self.resolve(virtual_path)?;
        fs::read(&host).map_err(|e| io_error(virtual_path, e))
    }

    fn read_dir(&self, virtual_path: &str) -> VfsResult<Vec<Metadata>> {
        let host = self.resolve(virtual_path)?;
        let mut listing = Vec::new();
        let entries = fs::read_dir(&host).map_err(|e| io_error(virtual_path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(virtual_path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().map_err(|e| io_error(virtual_path, e))?;
            listing.push(Self::metadata(&name, &meta));
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn write(&self, virtual_path: &str, data: &[u8]) -> VfsResult<()> {
        let host = self.resolve(virtual_path)?;
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(virtual_path, e))?;
        }
        fs::write(&host, data).map_err(|e| io_error(virtual_path, e))
    }

    fn mkdir_all(&self, virtual_path: &str) -> VfsResult<()> {
        let host = self.resolve(virtual_path)?;
        fs::create_dir_all(&host).map_err(|e| io_error(virtual_path, e))
    }

    fn remove(&self, virtual_path: &str) -> VfsResult<()> {
        let host = self.resolve(virtual_path)?;
        let meta = fs::metadata(&host).map_err(|e| io_error(virtual_path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(&host).map_err(|e| io_error(virtual_path, e))
        } else {
            fs::remove_file(&host).map_err(|e| io_error(virtual_path, e))
        }
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_host = self.resolve(from)?;
        let to_host = self.resolve(to)?;
        if let Some(parent) = to_host.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(to, e))?;
        }
        fs::rename(&from_host, &to_host).map_err(|e| io_error(from, e))
    }
}

impl OsFs {
    /// Host path the filesystem is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trip_under_root() {
        let dir = TempDir::new().expect("tmp");
        let fs = OsFs::new(dir.path());
        fs.write("/kernel/cache/abc", b"artifact").expect("write");
        assert_eq!(fs.read("/kernel/cache/abc").expect("read"), b"artifact");
        assert!(dir.path().join("kernel/cache/abc").exists());
    }

    #[test]
    fn escapes_are_cleaned_away() {
        let dir = TempDir::new().expect("tmp");
        let fs = OsFs::new(dir.path());
        fs.write("/../../etc/oops", b"x").expect("write");
        assert!(dir.path().join("etc/oops").exists());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().expect("tmp");
        let fs = OsFs::new(dir.path());
        assert!(matches!(fs.read("/nope"), Err(VfsError::NotFound(_))));
    }
}
