use thiserror::Error;

use sos_sandbox::SandboxError;
use sos_vfs::VfsError;

use crate::status::BundleStatus;

pub type KernelResult<T> = Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no script for specifier '{specifier}' in bundle '{bundle}' (resolved to {path})")]
    PathResolution {
        specifier: String,
        bundle: String,
        path: String,
    },
    #[error("no such script: {0}")]
    NotFound(String),
    #[error("read error at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: VfsError,
    },
    #[error("transpile error for {path}: {message}")]
    Transpile { path: String, message: String },
    #[error("compile error for {path}: {source}")]
    Compile {
        path: String,
        #[source]
        source: SandboxError,
    },
    #[error("execution error in {path}: {source}")]
    Execution {
        path: String,
        #[source]
        source: SandboxError,
    },
    #[error("module load error for {path}: {message}")]
    Load { path: String, message: String },
    #[error("registration error: {0}")]
    Registration(String),
    #[error("illegal access violation: {caller} cannot access {origin}::{property}")]
    AccessDenied {
        caller: String,
        origin: String,
        property: String,
    },
    #[error("lifecycle error: bundle '{bundle}' cannot transition from {from} to {to}")]
    Lifecycle {
        bundle: String,
        from: BundleStatus,
        to: BundleStatus,
    },
    #[error("bundle '{bundle}' failed to start: {source}")]
    BundleLoad {
        bundle: String,
        #[source]
        source: Box<KernelError>,
    },
    #[error("manifest error in {path}: {message}")]
    Manifest { path: String, message: String },
}

impl KernelError {
    pub(crate) fn read(path: impl Into<String>, source: VfsError) -> Self {
        let path = path.into();
        if source.is_not_found() {
            KernelError::NotFound(path)
        } else {
            KernelError::Read { path, source }
        }
    }

    /// Lifts an engine error out of a script run, preserving access
    /// violations as their own kind.
    pub(crate) fn from_sandbox(path: &str, source: SandboxError) -> Self {
        match source {
            SandboxError::AccessDenied {
                caller,
                origin,
                property,
            } => KernelError::AccessDenied {
                caller,
                origin,
                property,
            },
            source @ SandboxError::Compile { .. } => KernelError::Compile {
                path: path.to_string(),
                source,
            },
            source => KernelError::Execution {
                path: path.to_string(),
                source,
            },
        }
    }

    /// Pushes a kernel error back across the engine boundary (used when a
    /// host primitive invoked from script fails).
    pub(crate) fn into_sandbox(self) -> SandboxError {
        match self {
            KernelError::AccessDenied {
                caller,
                origin,
                property,
            } => SandboxError::AccessDenied {
                caller,
                origin,
                property,
            },
            other => SandboxError::Execution(other.to_string()),
        }
    }
}
