//! Source acquisition and the process-wide script cache.

use std::rc::Rc;

use log::{debug, info};

use sos_sandbox::{Program, Sandbox};
use sos_vfs::{path, SharedVfs, Vfs};

use crate::bundle::Bundle;
use crate::kernel::Kernel;
use crate::resolver::ResolvedScriptPath;
use crate::util::{decompress, is_typescript, sha256_hex};
use crate::{KernelError, KernelResult};

/// Hook between the kernel and raw file reads, so embedders can interpose
/// on resource loading (signature verification, metering).
pub trait ResourceLoader {
    fn load_resource(&self, filesystem: &dyn Vfs, filename: &str) -> KernelResult<Vec<u8>>;
}

/// Default loader: plain filesystem reads.
pub struct FsResourceLoader;

impl ResourceLoader for FsResourceLoader {
    fn load_resource(&self, filesystem: &dyn Vfs, filename: &str) -> KernelResult<Vec<u8>> {
        filesystem
            .read(filename)
            .map_err(|err| KernelError::read(filename, err))
    }
}

impl Kernel {
    /// Qualifies a bundle-local path with the bundle's base path so cache
    /// keys are unambiguous process-wide.
    pub(crate) fn to_kernel_path(&self, bundle: &Rc<Bundle>, file: &str) -> String {
        if bundle.id() == self.bundle.id() {
            path::clean(file)
        } else {
            path::join(bundle.base_path(), file.trim_start_matches('/'))
        }
    }

    /// Script-cache / transpile-cache key for a resolved path.
    pub(crate) fn cache_key(&self, bundle: &Rc<Bundle>, file: &str) -> String {
        sha256_hex(self.to_kernel_path(bundle, file).as_bytes())
    }

    /// Reads and decompresses a file through the resource loader.
    pub(crate) fn load_content(
        &self,
        filesystem: &SharedVfs,
        filename: &str,
    ) -> KernelResult<Vec<u8>> {
        debug!("Kernel: loading content from {filename}");
        let raw = self
            .config
            .resource_loader
            .load_resource(filesystem.as_ref(), filename)?;
        decompress(filename, raw)
    }

    /// Produces the executable source text for a script: TypeScript goes
    /// through the transpile cache, everything else is read directly.
    pub(crate) fn load_source(&self, bundle: &Rc<Bundle>, filename: &str) -> KernelResult<String> {
        if is_typescript(filename) {
            let kernel_path = self.to_kernel_path(bundle, filename);
            let kernel_fs = self.bundle.filesystem();
            return self.transpile_cache.borrow_mut().transpiled_source(
                kernel_fs.as_ref(),
                self.config.transpiler.as_ref(),
                self.config.resource_loader.as_ref(),
                bundle.filesystem().as_ref(),
                bundle.id(),
                bundle.name(),
                filename,
                &kernel_path,
            );
        }
        let bytes = self.load_content(&bundle.filesystem(), filename)?;
        String::from_utf8(bytes).map_err(|_| KernelError::Load {
            path: filename.to_string(),
            message: "script source is not valid UTF-8".to_string(),
        })
    }

    /// Compiles a resolved script, memoizing the program process-wide.
    /// Non-cacheable compilations are never inserted.
    pub(crate) fn load_script_source(
        &self,
        script_path: &ResolvedScriptPath,
        allow_caching: bool,
    ) -> KernelResult<Program> {
        let loader = &script_path.loader;
        let key = self.cache_key(loader, &script_path.path);

        if allow_caching {
            if let Some(program) = self.script_cache.borrow().get(&key) {
                info!(
                    "Kernel: reusing compiled program for {}:{}",
                    loader.name(),
                    script_path.path
                );
                return Ok(program.clone());
            }
        }

        let source = self.load_source(loader, &script_path.path)?;
        let loader_name = format!("{}:{}", loader.name(), script_path.path);
        let compiled = loader
            .sandbox()?
            .compile(&loader_name, &source)
            .map_err(|err| KernelError::from_sandbox(&script_path.path, err))?;

        if allow_caching && compiled.cacheable {
            self.script_cache
                .borrow_mut()
                .insert(key, compiled.program.clone());
        }
        Ok(compiled.program)
    }
}
