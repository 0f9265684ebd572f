//! Re-roots another filesystem at a base directory.

use crate::{path, Metadata, SharedVfs, Vfs, VfsError, VfsResult};

/// Presents `base` inside `inner` as the root. A bundle rooted at
/// `/kernel/apps/app1` sees `/index.ts` for `/kernel/apps/app1/index.ts`.
pub struct BasePathFs {
    inner: SharedVfs,
    base: String,
}

impl BasePathFs {
    pub fn new(inner: SharedVfs, base: &str) -> Self {
        Self {
            inner,
            base: path::clean(base),
        }
    }

    fn full(&self, virtual_path: &str) -> VfsResult<String> {
        if !path::is_abs(virtual_path) {
            return Err(VfsError::AbsolutePathRequired(virtual_path.to_string()));
        }
        // Clean before prefixing so `..` cannot climb out of the base.
        let cleaned = path::clean(virtual_path);
        Ok(path::clean(&format!("{}{}", self.base, cleaned)))
    }
}

impl Vfs for BasePathFs {
    fn name(&self) -> &'static str {
        "basepath"
    }

    fn stat(&self, virtual_path: &str) -> VfsResult<Metadata> {
        self.inner.stat(&self.full(virtual_path)?)
    }

    fn read(&self, virtual_path: &str) -> VfsResult<Vec<u8>> {
        self.inner.read(&self.full(virtual_path)?)
    }

    fn read_dir(&self, virtual_path: &str) -> VfsResult<Vec<Metadata>> {
        self.inner.read_dir(&self.full(virtual_path)?)
    }

    fn write(&self, virtual_path: &str, data: &[u8]) -> VfsResult<()> {
        self.inner.write(&self.full(virtual_path)?, data)
    }

    fn mkdir_all(&self, virtual_path: &str) -> VfsResult<()> {
        self.inner.mkdir_all(&self.full(virtual_path)?)
    }

    fn remove(&self, virtual_path: &str) -> VfsResult<()> {
        self.inner.remove(&self.full(virtual_path)?)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.inner.rename(&self.full(from)?, &self.full(to)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemFs;
    use std::rc::Rc;

    #[test]
    fn paths_are_rebased() {
        let mem = Rc::new(MemFs::new());
        mem.write("/kernel/apps/app1/index.ts", b"entry").expect("write");
        let fs = BasePathFs::new(mem.clone(), "/kernel/apps/app1");
        assert_eq!(fs.read("/index.ts").expect("read"), b"entry");
        fs.write("/out.txt", b"o").expect("write");
        assert_eq!(mem.read("/kernel/apps/app1/out.txt").expect("read"), b"o");
    }

    #[test]
    fn cannot_escape_base() {
        let mem = Rc::new(MemFs::new());
        mem.write("/secret.txt", b"s").expect("write");
        mem.write("/kernel/apps/app1/index.ts", b"entry").expect("write");
        let fs = BasePathFs::new(mem, "/kernel/apps/app1");
        assert!(fs.read("/../../../secret.txt").is_err());
    }
}
