//! Read-only wrapper over another filesystem.

use crate::{Metadata, SharedVfs, Vfs, VfsError, VfsResult};

pub struct ReadOnlyFs {
    inner: SharedVfs,
}

impl ReadOnlyFs {
    pub fn new(inner: SharedVfs) -> Self {
        Self { inner }
    }
}

impl Vfs for ReadOnlyFs {
    fn name(&self) -> &'static str {
        "readonly"
    }

    fn stat(&self, path: &str) -> VfsResult<Metadata> {
        self.inner.stat(path)
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.inner.read(path)
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<Metadata>> {
        self.inner.read_dir(path)
    }

    fn write(&self, path: &str, _data: &[u8]) -> VfsResult<()> {
        Err(VfsError::ReadOnly(path.to_string()))
    }

    fn mkdir_all(&self, path: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly(path.to_string()))
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly(path.to_string()))
    }

    fn rename(&self, from: &str, _to: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly(from.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemFs;
    use std::rc::Rc;

    #[test]
    fn reads_pass_writes_fail() {
        let mem = MemFs::new();
        mem.write("/f.ts", b"x").expect("write");
        let ro = ReadOnlyFs::new(Rc::new(mem));
        assert_eq!(ro.read("/f.ts").expect("read"), b"x");
        assert!(matches!(ro.write("/f.ts", b"y"), Err(VfsError::ReadOnly(_))));
        assert!(matches!(ro.remove("/f.ts"), Err(VfsError::ReadOnly(_))));
    }
}
