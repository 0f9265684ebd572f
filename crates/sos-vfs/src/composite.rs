//! Layered filesystem: a base view with additional mounts grafted at
//! absolute paths. Operations route to the longest matching mount.

use std::time::SystemTime;

use indexmap::IndexMap;

use crate::{path, FileKind, Metadata, SharedVfs, Vfs, VfsError, VfsResult};

pub struct CompositeFs {
    base: SharedVfs,
    mounts: IndexMap<String, SharedVfs>,
    created: SystemTime,
}

impl CompositeFs {
    pub fn new(base: SharedVfs) -> Self {
        Self {
            base,
            mounts: IndexMap::new(),
            created: SystemTime::now(),
        }
    }

    /// Grafts `mount` at the absolute `mount_path`. Mounts are added at
    /// construction time only; the composed view is immutable afterwards.
    pub fn mount(&mut self, mount: SharedVfs, mount_path: &str) {
        let mount_path = path::clean(&format!("/{mount_path}"));
        self.mounts.insert(mount_path, mount);
    }

    /// Longest-prefix mount match. Returns the mount path (`None` for the
    /// base), the filesystem, and the path inside it.
    fn route<'a>(&'a self, raw: &str) -> (Option<&'a str>, &'a dyn Vfs, String) {
        let cleaned = path::clean(raw);
        let segs = path::segments(&cleaned);
        for take in (1..=segs.len()).rev() {
            let candidate = format!("/{}", segs[..take].join("/"));
            if let Some((key, fs)) = self.mounts.get_key_value(candidate.as_str()) {
                let inner = format!("/{}", segs[take..].join("/"));
                return (Some(key.as_str()), fs.as_ref(), path::clean(&inner));
            }
        }
        (None, self.base.as_ref(), cleaned)
    }

    /// Mount paths whose parent directory is exactly `dir`.
    fn mounts_under(&self, dir: &str) -> Vec<&str> {
        let dir = path::clean(dir);
        self.mounts
            .keys()
            .filter(|mount_path| path::dir(mount_path) == dir)
            .map(String::as_str)
            .collect()
    }

    fn shadow_dir(&self, cleaned: &str) -> Metadata {
        Metadata {
            name: path::base(cleaned).to_string(),
            len: 0,
            modified: self.created,
            kind: FileKind::Dir,
            capability: None,
        }
    }
}

impl Vfs for CompositeFs {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn stat(&self, raw: &str) -> VfsResult<Metadata> {
        let cleaned = path::clean(raw);
        let (_, fs, inner) = self.route(&cleaned);
        match fs.stat(&inner) {
            Ok(meta) => Ok(meta),
            Err(err) if err.is_not_found() => {
                // A parent of a mount exists even when the base lacks it.
                if !self.mounts_under(&cleaned).is_empty() {
                    Ok(self.shadow_dir(&cleaned))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    fn read(&self, raw: &str) -> VfsResult<Vec<u8>> {
        let (_, fs, inner) = self.route(raw);
        fs.read(&inner)
    }

    fn read_dir(&self, raw: &str) -> VfsResult<Vec<Metadata>> {
        let cleaned = path::clean(raw);
        let synthetic = self.mounts_under(&cleaned);
        let (_, fs, inner) = self.route(&cleaned);
        let mut listing = match fs.read_dir(&inner) {
            Ok(listing) => listing,
            Err(err) if err.is_not_found() && !synthetic.is_empty() => Vec::new(),
            Err(err) => return Err(err),
        };
        for mount_path in synthetic {
            let name = path::base(mount_path);
            if listing.iter().any(|meta| meta.name == name) {
                continue;
            }
            listing.push(self.stat(mount_path)?);
        }
        Ok(listing)
    }

    fn write(&self, raw: &str, data: &[u8]) -> VfsResult<()> {
        let cleaned = path::clean(raw);
        if !self.mounts_under(&cleaned).is_empty() {
            // Shadow directories reject writes.
            return Err(VfsError::PermissionDenied(cleaned));
        }
        let (_, fs, inner) = self.route(&cleaned);
        fs.write(&inner, data)
    }

    fn mkdir_all(&self, raw: &str) -> VfsResult<()> {
        let (_, fs, inner) = self.route(raw);
        fs.mkdir_all(&inner)
    }

    fn remove(&self, raw: &str) -> VfsResult<()> {
        let (_, fs, inner) = self.route(raw);
        fs.remove(&inner)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let (from_mount, from_fs, from_inner) = self.route(from);
        let (to_mount, _, to_inner) = self.route(to);
        if from_mount != to_mount {
            return Err(VfsError::CrossMountRename {
                from: path::clean(from),
                to: path::clean(to),
            });
        }
        from_fs.rename(&from_inner, &to_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemFs, ReadOnlyFs};
    use std::rc::Rc;

    fn composed() -> CompositeFs {
        let base = Rc::new(MemFs::new());
        base.write("/kernel/apps/app1/index.ts", b"entry").expect("write");
        let types = Rc::new(MemFs::new());
        types.write("/logger", b"").expect("write");
        let mut fs = CompositeFs::new(Rc::new(ReadOnlyFs::new(base)));
        fs.mount(types, "/kernel/@types");
        fs
    }

    #[test]
    fn routes_to_longest_mount() {
        let fs = composed();
        assert_eq!(fs.read("/kernel/@types/logger").expect("read"), b"");
        assert_eq!(fs.read("/kernel/apps/app1/index.ts").expect("read"), b"entry");
    }

    #[test]
    fn shadow_directory_for_mount_parents() {
        let base = Rc::new(MemFs::new());
        let types = Rc::new(MemFs::new());
        let mut fs = CompositeFs::new(base);
        fs.mount(types, "/kernel/@types");
        let meta = fs.stat("/kernel").expect("stat shadow");
        assert!(meta.is_dir());
        assert!(matches!(
            fs.write("/kernel", b"x"),
            Err(VfsError::PermissionDenied(_))
        ));
    }

    #[test]
    fn read_dir_merges_mount_entries() {
        let fs = composed();
        let names: Vec<String> = fs
            .read_dir("/kernel")
            .expect("read_dir")
            .into_iter()
            .map(|meta| meta.name)
            .collect();
        assert!(names.contains(&"apps".to_string()));
        assert!(names.contains(&"@types".to_string()));
    }

    #[test]
    fn cross_mount_rename_is_refused() {
        let fs = composed();
        let err = fs
            .rename("/kernel/@types/logger", "/kernel/apps/logger")
            .expect_err("must refuse");
        assert!(matches!(err, VfsError::CrossMountRename { .. }));
    }

    #[test]
    fn mount_point_itself_stats_as_directory() {
        let fs = composed();
        assert!(fs.stat("/kernel/@types").expect("stat").is_dir());
    }
}
