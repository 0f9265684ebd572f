//! In-memory tree of zero-byte capability files. The kernel grafts one of
//! these at the reserved types path of every bundle so bare imports resolve
//! to native modules through the same probing loop as ordinary scripts.

use std::time::SystemTime;

use crate::{path, Capability, FileKind, Metadata, Vfs, VfsError, VfsResult};

struct ExportNode {
    name: String,
    kind: FileKind,
    modified: SystemTime,
    capability: Option<Capability>,
    children: Vec<ExportNode>,
}

impl ExportNode {
    fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FileKind::Dir,
            modified: SystemTime::now(),
            capability: None,
            children: Vec::new(),
        }
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            name: self.name.clone(),
            len: 0,
            modified: self.modified,
            kind: self.kind,
            capability: self.capability.clone(),
        }
    }
}

/// Read-only synthetic filesystem. Files are registered before the tree is
/// shared with bundles; afterwards every mutation is denied. Only absolute
/// lookups are accepted.
pub struct ExportsFs {
    root: ExportNode,
}

impl Default for ExportsFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportsFs {
    pub fn new() -> Self {
        Self {
            root: ExportNode::dir(""),
        }
    }

    /// Registers the capability file at `file_path`, creating intermediate
    /// directories. Fails if a file is in the way.
    pub fn add_file(&mut self, file_path: &str, capability: Capability) -> VfsResult<()> {
        let cleaned = Self::canonical(file_path)?;
        let segs = path::segments(&cleaned);
        let Some((file_name, dirs)) = segs.split_last() else {
            return Err(VfsError::IsADirectory(cleaned));
        };
        let mut node = &mut self.root;
        for seg in dirs {
            let idx = match node.children.iter().position(|child| child.name == *seg) {
                Some(idx) if node.children[idx].kind.is_dir() => idx,
                Some(_) => return Err(VfsError::NotADirectory(cleaned)),
                None => {
                    node.children.push(ExportNode::dir(seg));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
        }
        node.children.push(ExportNode {
            name: file_name.to_string(),
            kind: FileKind::File,
            modified: SystemTime::now(),
            capability: Some(capability),
            children: Vec::new(),
        });
        Ok(())
    }

    fn canonical(raw: &str) -> VfsResult<String> {
        if !path::is_abs(raw) {
            return Err(VfsError::AbsolutePathRequired(raw.to_string()));
        }
        Ok(path::clean(raw))
    }

    fn find(&self, raw: &str) -> VfsResult<&ExportNode> {
        let cleaned = Self::canonical(raw)?;
        let mut node = &self.root;
        for seg in path::segments(&cleaned) {
            if !node.kind.is_dir() {
                return Err(VfsError::NotFound(cleaned));
            }
            node = node
                .children
                .iter()
                .find(|child| child.name == seg)
                .ok_or_else(|| VfsError::NotFound(cleaned.clone()))?;
        }
        Ok(node)
    }
}

impl Vfs for ExportsFs {
    fn name(&self) -> &'static str {
        "exportsfs"
    }

    fn stat(&self, raw: &str) -> VfsResult<Metadata> {
        Ok(self.find(raw)?.metadata())
    }

    fn read(&self, raw: &str) -> VfsResult<Vec<u8>> {
        let node = self.find(raw)?;
        if node.kind.is_dir() {
            return Err(VfsError::IsADirectory(path::clean(raw)));
        }
        // Capability files are zero bytes; their content is not the API.
        Ok(Vec::new())
    }

    fn read_dir(&self, raw: &str) -> VfsResult<Vec<Metadata>> {
        self.find(raw)?;
        Err(VfsError::PermissionDenied(path::clean(raw)))
    }

    fn write(&self, raw: &str, _data: &[u8]) -> VfsResult<()> {
        Err(VfsError::PermissionDenied(raw.to_string()))
    }

    fn mkdir_all(&self, raw: &str) -> VfsResult<()> {
        Err(VfsError::PermissionDenied(raw.to_string()))
    }

    fn remove(&self, raw: &str) -> VfsResult<()> {
        Err(VfsError::PermissionDenied(raw.to_string()))
    }

    fn rename(&self, from: &str, _to: &str) -> VfsResult<()> {
        Err(VfsError::PermissionDenied(from.to_string()))
    }
}
