//! In-memory filesystem used for tests and kernel scratch areas.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::{path, FileKind, Metadata, Vfs, VfsError, VfsResult};

#[derive(Clone)]
enum MemEntry {
    File { data: Vec<u8>, modified: SystemTime },
    Dir { modified: SystemTime },
}

impl MemEntry {
    fn kind(&self) -> FileKind {
        match self {
            MemEntry::File { .. } => FileKind::File,
            MemEntry::Dir { .. } => FileKind::Dir,
        }
    }
}

/// Flat-map in-memory tree keyed by cleaned absolute path. Writes create
/// missing parent directories, matching the behavior of the memory
/// filesystems this view stands in for during tests.
pub struct MemFs {
    entries: RefCell<BTreeMap<String, MemEntry>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "/".to_string(),
            MemEntry::Dir {
                modified: SystemTime::now(),
            },
        );
        Self {
            entries: RefCell::new(entries),
        }
    }

    fn canonical(path: &str) -> VfsResult<String> {
        if !path::is_abs(path) {
            return Err(VfsError::AbsolutePathRequired(path.to_string()));
        }
        Ok(path::clean(path))
    }

    fn ensure_parents(&self, path: &str) {
        let mut entries = self.entries.borrow_mut();
        let mut dir = path::dir(path);
        while dir != "/" {
            entries.entry(dir.clone()).or_insert(MemEntry::Dir {
                modified: SystemTime::now(),
            });
            dir = path::dir(&dir);
        }
    }

    fn metadata(name: &str, entry: &MemEntry) -> Metadata {
        match entry {
            MemEntry::File { data, modified } => Metadata {
                name: name.to_string(),
                len: data.len() as u64,
                modified: *modified,
                kind: FileKind::File,
                capability: None,
            },
            MemEntry::Dir { modified } => Metadata {
                name: name.to_string(),
                len: 0,
                modified: *modified,
                kind: FileKind::Dir,
                capability: None,
            },
        }
    }
}

impl Vfs for MemFs {
    fn name(&self) -> &'static str {
        "memfs"
    }

    fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let path = Self::canonical(path)?;
        let entries = self.entries.borrow();
        let entry = entries
            .get(&path)
            .ok_or_else(|| VfsError::NotFound(path.clone()))?;
        Ok(Self::metadata(path::base(&path), entry))
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let path = Self::canonical(path)?;
        let entries = self.entries.borrow();
        match entries.get(&path) {
            Some(MemEntry::File { data, .. }) => Ok(data.clone()),
            Some(MemEntry::Dir { .. }) => Err(VfsError::IsADirectory(path)),
            None => Err(VfsError::NotFound(path)),
        }
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<Metadata>> {
        let path = Self::canonical(path)?;
        let entries = self.entries.borrow();
        match entries.get(&path) {
            Some(MemEntry::Dir { .. }) => {}
            Some(_) => return Err(VfsError::NotADirectory(path)),
            None => return Err(VfsError::NotFound(path)),
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut listing = Vec::new();
        for (entry_path, entry) in entries.range(prefix.clone()..) {
            if !entry_path.starts_with(&prefix) {
                break;
            }
            let rest = &entry_path[prefix.len()..];
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            listing.push(Self::metadata(rest, entry));
        }
        Ok(listing)
    }

    fn write(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let path = Self::canonical(path)?;
        if path == "/" {
            return Err(VfsError::IsADirectory(path));
        }
        self.ensure_parents(&path);
        let mut entries = self.entries.borrow_mut();
        if matches!(entries.get(&path), Some(MemEntry::Dir { .. })) {
            return Err(VfsError::IsADirectory(path));
        }
        entries.insert(
            path,
            MemEntry::File {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn mkdir_all(&self, path: &str) -> VfsResult<()> {
        let path = Self::canonical(path)?;
        self.ensure_parents(&path);
        let mut entries = self.entries.borrow_mut();
        match entries.get(&path) {
            Some(MemEntry::File { .. }) => Err(VfsError::NotADirectory(path)),
            Some(MemEntry::Dir { .. }) => Ok(()),
            None => {
                entries.insert(
                    path,
                    MemEntry::Dir {
                        modified: SystemTime::now(),
                    },
                );
                Ok(())
            }
        }
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        let path = Self::canonical(path)?;
        if path == "/" {
            return Err(VfsError::PermissionDenied(path));
        }
        let mut entries = self.entries.borrow_mut();
        if entries.remove(&path).is_none() {
            return Err(VfsError::NotFound(path));
        }
        let prefix = format!("{path}/");
        let doomed: Vec<String> = entries
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(p, _)| p.clone())
            .collect();
        for p in doomed {
            entries.remove(&p);
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = Self::canonical(from)?;
        let to = Self::canonical(to)?;
        self.ensure_parents(&to);
        let mut entries = self.entries.borrow_mut();
        let entry = entries
            .remove(&from)
            .ok_or_else(|| VfsError::NotFound(from.clone()))?;
        let prefix = format!("{from}/");
        let children: Vec<(String, MemEntry)> = entries
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        for (p, _) in &children {
            entries.remove(p);
        }
        for (p, e) in children {
            let moved = format!("{to}/{}", &p[prefix.len()..]);
            entries.insert(moved, e);
        }
        entries.insert(to, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents() {
        let fs = MemFs::new();
        fs.write("/kernel/apps/app1/index.ts", b"code").expect("write");
        assert!(fs.stat("/kernel/apps/app1").expect("stat").is_dir());
        assert_eq!(fs.read("/kernel/apps/app1/index.ts").expect("read"), b"code");
    }

    #[test]
    fn read_dir_lists_direct_children_only() {
        let fs = MemFs::new();
        fs.write("/a/one.ts", b"1").expect("write");
        fs.write("/a/sub/two.ts", b"2").expect("write");
        let names: Vec<String> = fs
            .read_dir("/a")
            .expect("read_dir")
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["one.ts", "sub"]);
    }

    #[test]
    fn rename_moves_subtree() {
        let fs = MemFs::new();
        fs.write("/a/b/c.ts", b"c").expect("write");
        fs.rename("/a", "/z").expect("rename");
        assert!(fs.stat("/a").is_err());
        assert_eq!(fs.read("/z/b/c.ts").expect("read"), b"c");
    }

    #[test]
    fn remove_is_recursive() {
        let fs = MemFs::new();
        fs.write("/a/b.ts", b"b").expect("write");
        fs.remove("/a").expect("remove");
        assert!(fs.stat("/a/b.ts").is_err());
    }
}
