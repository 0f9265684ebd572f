//! Virtual-filesystem abstractions plus OS-backed, in-memory, and synthetic backends.
//!
//! Every path handled by this crate is a virtual, `/`-separated path that is
//! independent of the host platform. Bundles only ever see composed,
//! read-mostly views built from these pieces.

mod basepath;
mod composite;
mod exports;
mod memfs;
mod osfs;
pub mod path;
mod readonly;

pub use basepath::BasePathFs;
pub use composite::CompositeFs;
pub use exports::ExportsFs;
pub use memfs::MemFs;
pub use osfs::OsFs;
pub use readonly::ReadOnlyFs;

use std::any::Any;
use std::io;
use std::rc::Rc;
use std::time::SystemTime;

pub type VfsResult<T> = Result<T, VfsError>;

/// Shared handle to a filesystem view.
pub type SharedVfs = Rc<dyn Vfs>;

/// Opaque payload attached to synthetic capability files. The kernel stores
/// a resolver closure here and downcasts it on lookup.
pub type Capability = Rc<dyn Any>;

#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("read-only filesystem: {0}")]
    ReadOnly(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("cannot rename across filesystem mounts: {from} -> {to}")]
    CrossMountRename { from: String, to: String },
    #[error("only absolute paths are allowed: {0}")]
    AbsolutePathRequired(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

pub(crate) fn io_error(path: impl Into<String>, err: io::Error) -> VfsError {
    let path = path.into();
    if err.kind() == io::ErrorKind::NotFound {
        VfsError::NotFound(path)
    } else {
        VfsError::Io { path, source: err }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
}

impl FileKind {
    pub fn is_dir(self) -> bool {
        matches!(self, FileKind::Dir)
    }
}

/// Stat result for a single node. `capability` is populated only by the
/// kernel-exports filesystem; everywhere else it is `None`.
#[derive(Clone)]
pub struct Metadata {
    pub name: String,
    pub len: u64,
    pub modified: SystemTime,
    pub kind: FileKind,
    pub capability: Option<Capability>,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("kind", &self.kind)
            .field("capability", &self.capability.is_some())
            .finish()
    }
}

/// A virtual filesystem. Implementations route virtual absolute paths to
/// their backing store; read-mostly views reject every mutation.
pub trait Vfs {
    fn name(&self) -> &'static str;

    fn stat(&self, path: &str) -> VfsResult<Metadata>;
    fn read(&self, path: &str) -> VfsResult<Vec<u8>>;
    fn read_dir(&self, path: &str) -> VfsResult<Vec<Metadata>>;

    fn write(&self, path: &str, data: &[u8]) -> VfsResult<()>;
    fn mkdir_all(&self, path: &str) -> VfsResult<()>;
    fn remove(&self, path: &str) -> VfsResult<()>;
    fn rename(&self, from: &str, to: &str) -> VfsResult<()>;
}

/// True when `path` stats successfully on `fs`.
pub fn exists(fs: &dyn Vfs, path: &str) -> bool {
    fs.stat(path).is_ok()
}

/// True when `path` stats to a capability-bearing file (a kernel virtual
/// file rather than an on-disk script).
pub fn is_capability_file(fs: &dyn Vfs, path: &str) -> bool {
    fs.stat(path)
        .map(|meta| meta.capability.is_some() && !meta.is_dir())
        .unwrap_or(false)
}

/// Walk `fs` depth-first from `root`, calling `visit` for every file.
/// Directories for which `skip` returns true are not descended into.
pub fn walk_files(
    fs: &dyn Vfs,
    root: &str,
    skip: &dyn Fn(&str) -> bool,
    visit: &mut dyn FnMut(&str, &Metadata) -> VfsResult<()>,
) -> VfsResult<()> {
    let entries = match fs.read_dir(root) {
        Ok(entries) => entries,
        Err(VfsError::PermissionDenied(_)) => return Ok(()),
        Err(err) => return Err(err),
    };
    for entry in entries {
        let child = path::join(root, &entry.name);
        if entry.is_dir() {
            if !skip(&child) {
                walk_files(fs, &child, skip, visit)?;
            }
        } else {
            visit(&child, &entry)?;
        }
    }
    Ok(())
}
