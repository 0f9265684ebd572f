//! Transpiler contract and the content-addressed on-disk transpile cache.
//!
//! The transpiler itself is an external collaborator: a pure string
//! transform with a version tag. The cache machinery here owns the
//! `/kernel/cache` area and its `cache.json` manifest. Artifacts are keyed
//! by the hash of the caller-qualified kernel path so two bundles with the
//! same relative filename never collide; the content hash is only the
//! invalidation check.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use sos_vfs::{exists, path, walk_files, Vfs};

use crate::kernel::{Kernel, KERNEL_CACHE_PATH};
use crate::script::ResourceLoader;
use crate::util::{decompress, is_typescript, sha256_hex};
use crate::{KernelError, KernelResult};

pub const CACHE_MANIFEST_FILE: &str = "cache.json";

/// Pure source transform.
pub trait Transpiler {
    fn version(&self) -> &str;
    fn transpile(&self, source: &str) -> Result<String, String>;
}

/// Default transform for deployments whose sources are pre-transpiled or
/// native host programs: passes text through untouched.
pub struct IdentityTranspiler;

impl Transpiler for IdentityTranspiler {
    fn version(&self) -> &str {
        "identity-1"
    }

    fn transpile(&self, source: &str) -> Result<String, String> {
        Ok(source.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranspiledModule {
    pub original_file: String,
    pub cache_file: String,
    pub checksum: String,
    pub bundle_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheManifest {
    pub transpiler_version: String,
    pub modules: Vec<TranspiledModule>,
}

/// In-memory view of the persisted manifest. Single-writer: only the
/// kernel mutates it, and on-disk state is updated before memory.
pub struct TranspileCache {
    manifest: CacheManifest,
}

impl TranspileCache {
    /// Loads the manifest from the kernel cache area. A missing or corrupt
    /// manifest, or a transpiler version change, yields an empty cache.
    pub fn load(kernel_fs: &dyn Vfs, transpiler_version: &str) -> Self {
        let manifest_path = path::join(KERNEL_CACHE_PATH, CACHE_MANIFEST_FILE);
        let manifest = match kernel_fs.read(&manifest_path) {
            Ok(bytes) => match serde_json::from_slice::<CacheManifest>(&bytes) {
                Ok(manifest) if manifest.transpiler_version == transpiler_version => {
                    info!(
                        "Transpiler: loaded cache manifest with {} entries",
                        manifest.modules.len()
                    );
                    manifest
                }
                Ok(manifest) => {
                    info!(
                        "Transpiler: discarding cache built by transpiler '{}' (now '{}')",
                        manifest.transpiler_version, transpiler_version
                    );
                    CacheManifest {
                        transpiler_version: transpiler_version.to_string(),
                        ..Default::default()
                    }
                }
                Err(err) => {
                    warn!("Transpiler: ignoring corrupt cache manifest: {err}");
                    CacheManifest {
                        transpiler_version: transpiler_version.to_string(),
                        ..Default::default()
                    }
                }
            },
            Err(_) => CacheManifest {
                transpiler_version: transpiler_version.to_string(),
                ..Default::default()
            },
        };
        Self { manifest }
    }

    pub fn find(&self, kernel_path: &str) -> Option<&TranspiledModule> {
        self.manifest
            .modules
            .iter()
            .find(|module| module.original_file == kernel_path)
    }

    /// Returns the transpiled text for a TypeScript source, reusing the
    /// on-disk artifact when its recorded checksum still matches the
    /// source. On miss, invokes the transpiler and persists artifact plus
    /// manifest (write-then-rename); a failed transpile leaves the cache
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn transpiled_source(
        &mut self,
        kernel_fs: &dyn Vfs,
        transpiler: &dyn Transpiler,
        resource_loader: &dyn ResourceLoader,
        source_fs: &dyn Vfs,
        bundle_id: &str,
        bundle_name: &str,
        original_path: &str,
        kernel_path: &str,
    ) -> KernelResult<String> {
        let raw = resource_loader.load_resource(source_fs, original_path)?;
        let raw = decompress(original_path, raw)?;
        let code = String::from_utf8(raw).map_err(|_| KernelError::Transpile {
            path: original_path.to_string(),
            message: "source is not valid UTF-8".to_string(),
        })?;
        let checksum = sha256_hex(code.as_bytes());
        let cache_file = path::join(KERNEL_CACHE_PATH, &sha256_hex(kernel_path.as_bytes()));

        if let Some(entry) = self.find(kernel_path) {
            if entry.checksum == checksum && exists(kernel_fs, &entry.cache_file) {
                info!(
                    "Transpiler: already transpiled {bundle_name}:{original_path} as kernel:{}",
                    entry.cache_file
                );
                let cached = kernel_fs
                    .read(&entry.cache_file)
                    .map_err(|err| KernelError::read(entry.cache_file.clone(), err))?;
                return String::from_utf8(cached).map_err(|_| KernelError::Transpile {
                    path: entry.cache_file.clone(),
                    message: "cached artifact is not valid UTF-8".to_string(),
                });
            }
            info!("Transpiler: cache is out of date for {bundle_name}:{original_path}");
        }

        // Stale artifact, if any, goes first; a failed transpile must not
        // leave a matching manifest entry behind.
        let _ = kernel_fs.remove(&cache_file);

        info!("Transpiler: transpiling {bundle_name}:{original_path} to kernel:{cache_file}");
        let transpiled = transpiler
            .transpile(&code)
            .map_err(|message| KernelError::Transpile {
                path: original_path.to_string(),
                message,
            })?;

        kernel_fs
            .write(&cache_file, transpiled.as_bytes())
            .map_err(|err| KernelError::read(cache_file.clone(), err))?;

        let mut next = self.manifest.clone();
        next.modules
            .retain(|module| module.original_file != kernel_path);
        next.modules.push(TranspiledModule {
            original_file: kernel_path.to_string(),
            cache_file: cache_file.clone(),
            checksum,
            bundle_id: bundle_id.to_string(),
        });
        Self::store(kernel_fs, &next)?;
        self.manifest = next;

        Ok(transpiled)
    }

    /// Persists the manifest with write-then-rename.
    fn store(kernel_fs: &dyn Vfs, manifest: &CacheManifest) -> KernelResult<()> {
        let final_path = path::join(KERNEL_CACHE_PATH, CACHE_MANIFEST_FILE);
        let tmp_path = format!("{final_path}.tmp");
        let bytes = serde_json::to_vec(manifest).map_err(|err| KernelError::Manifest {
            path: final_path.clone(),
            message: err.to_string(),
        })?;
        kernel_fs
            .write(&tmp_path, &bytes)
            .map_err(|err| KernelError::read(tmp_path.clone(), err))?;
        kernel_fs
            .rename(&tmp_path, &final_path)
            .map_err(|err| KernelError::read(final_path.clone(), err))?;
        Ok(())
    }
}

impl Kernel {
    /// Walks the kernel filesystem and transpiles every out-of-date
    /// TypeScript source so bundles start from a warm cache. Individual
    /// failures are logged and skipped; they resurface when the owning
    /// bundle actually loads the script.
    pub fn transpile_all(&self) -> KernelResult<()> {
        let filesystem = self.bundle.filesystem();
        let mut failures = 0_usize;
        walk_files(
            filesystem.as_ref(),
            "/",
            &|dir| dir == KERNEL_CACHE_PATH,
            &mut |file, _meta| {
                if is_typescript(file) {
                    if let Err(err) = self.load_source(&self.bundle, file) {
                        warn!("Transpiler: pre-transpile of kernel:{file} failed: {err}");
                        failures += 1;
                    }
                }
                Ok(())
            },
        )
        .map_err(|err| KernelError::read("/", err))?;
        if failures > 0 {
            warn!("Transpiler: {failures} source file(s) failed to pre-transpile");
        }
        Ok(())
    }
}
