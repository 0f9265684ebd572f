//! Bundle manager: app enumeration, construction, and the start/stop
//! lifecycle.

use std::rc::Rc;

use log::{info, warn};
use serde::Deserialize;

use sos_vfs::{path, BasePathFs, CompositeFs, ExportsFs, ReadOnlyFs, SharedVfs, Vfs};

use crate::bundle::Bundle;
use crate::kernel::{Kernel, KERNEL_APPS_PATH, KERNEL_TYPES_PATH};
use crate::kmodule::ModuleCapability;
use crate::status::BundleStatus;
use crate::{KernelError, KernelResult};

pub const BUNDLE_MANIFEST_FILE: &str = "bundle.json";

/// `bundle.json` at each app root. Unknown fields are ignored; a missing
/// `id` or `name` is a load error.
#[derive(Clone, Debug, Deserialize)]
pub struct BundleManifest {
    pub id: String,
    pub name: String,
    pub entrypoint: String,
    #[serde(default)]
    pub privileges: Vec<String>,
}

/// Produces the composed, read-only filesystem view for an app bundle.
pub type NewBundleFilesystem = Rc<dyn Fn(&Rc<Kernel>, &str) -> KernelResult<SharedVfs>>;

/// Default composition: a read-only base-path view of the kernel
/// filesystem rooted at the app directory, overlaid with the
/// kernel-exports mount at the reserved types path.
pub fn default_bundle_filesystem() -> NewBundleFilesystem {
    Rc::new(|kernel: &Rc<Kernel>, app_path: &str| {
        let base: SharedVfs = Rc::new(ReadOnlyFs::new(Rc::new(BasePathFs::new(
            kernel.bundle.filesystem(),
            app_path,
        ))));
        let mut composite = CompositeFs::new(base);
        composite.mount(Rc::new(kernel.exports_filesystem()?), KERNEL_TYPES_PATH);
        Ok(Rc::new(composite) as SharedVfs)
    })
}

impl Kernel {
    /// Snapshot of the registered kernel modules as a synthetic
    /// filesystem: one zero-byte capability file per module.
    pub(crate) fn exports_filesystem(&self) -> KernelResult<ExportsFs> {
        let mut exports = ExportsFs::new();
        for module in self.bundle.modules() {
            if !module.is_kernel_module() {
                continue;
            }
            let file = format!("/{}", module.origin().filename());
            exports
                .add_file(&file, Rc::new(ModuleCapability::new(module.clone())))
                .map_err(|err| KernelError::read(file, err))?;
        }
        Ok(exports)
    }

    /// Walks the apps directory and starts every bundle candidate. One
    /// bundle's failure does not abort enumeration of the others.
    pub fn start(self: &Rc<Self>) -> KernelResult<()> {
        let kernel_fs = self.bundle.filesystem();
        let entries = match kernel_fs.read_dir(KERNEL_APPS_PATH) {
            Ok(entries) => entries,
            Err(err) if err.is_not_found() => {
                info!("BundleManager: no apps directory at {KERNEL_APPS_PATH}");
                return Ok(());
            }
            Err(err) => return Err(KernelError::read(KERNEL_APPS_PATH, err)),
        };

        for entry in entries {
            let app_path = path::join(KERNEL_APPS_PATH, &entry.name);
            if !entry.is_dir() {
                warn!("BundleManager: skipping non-directory app candidate {app_path}");
                continue;
            }
            match self.load_app_bundle(&app_path) {
                Ok(bundle) => {
                    info!(
                        "BundleManager: bundle '{}' started from {app_path}",
                        bundle.name()
                    );
                }
                Err(err) => {
                    warn!("BundleManager: failed to start bundle at {app_path}: {err}");
                }
            }
        }
        Ok(())
    }

    /// Constructs and starts one app bundle. On failure the bundle (if it
    /// got far enough to exist) is marked `FAILED` and the error is
    /// returned for the caller to log.
    pub fn load_app_bundle(self: &Rc<Self>, app_path: &str) -> KernelResult<Rc<Bundle>> {
        let manifest = self.read_bundle_manifest(app_path)?;
        info!(
            "BundleManager: loading bundle '{}' ({}) from kernel:{app_path}",
            manifest.name, manifest.id
        );

        let filesystem = (self.config.new_bundle_filesystem)(self, app_path)?;
        let sandbox = (self.config.sandbox_factory)(&manifest.name);
        let bundle = Bundle::new(
            Rc::downgrade(self),
            app_path,
            filesystem,
            &manifest.id,
            &manifest.name,
            manifest.privileges.clone(),
            false,
            sandbox,
        )?;
        self.bundles.borrow_mut().push(bundle.clone());

        match self.start_bundle(&bundle, &manifest) {
            Ok(()) => Ok(bundle),
            Err(err) => {
                bundle.fail();
                Err(KernelError::BundleLoad {
                    bundle: manifest.name.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    fn start_bundle(
        self: &Rc<Self>,
        bundle: &Rc<Bundle>,
        manifest: &BundleManifest,
    ) -> KernelResult<()> {
        for provider in &self.config.api_providers {
            provider(&self.bundle, bundle)?;
        }
        bundle.transition(BundleStatus::Starting)?;

        // The entrypoint is bundle-root-relative; a bare form gets
        // anchored so it cannot be mistaken for a kernel-module import.
        let entry = if manifest.entrypoint.starts_with('/')
            || manifest.entrypoint.starts_with("./")
            || manifest.entrypoint.starts_with("../")
        {
            manifest.entrypoint.clone()
        } else {
            format!("/{}", manifest.entrypoint)
        };
        let script_path = self.resolve_script_path(bundle, &entry)?;
        self.load_script_module(&manifest.id, "", &script_path, bundle)?;

        bundle.transition(BundleStatus::Started)?;
        Ok(())
    }

    fn read_bundle_manifest(&self, app_path: &str) -> KernelResult<BundleManifest> {
        let manifest_path = path::join(app_path, BUNDLE_MANIFEST_FILE);
        let bytes = self
            .bundle
            .filesystem()
            .read(&manifest_path)
            .map_err(|err| KernelError::read(manifest_path.clone(), err))?;
        serde_json::from_slice(&bytes).map_err(|err| KernelError::Manifest {
            path: manifest_path,
            message: err.to_string(),
        })
    }

    /// Stops every app bundle, then the kernel bundle itself. A stopped
    /// bundle cannot be restarted; its sandbox is dropped here.
    pub fn stop(self: &Rc<Self>) -> KernelResult<()> {
        let bundles: Vec<Rc<Bundle>> = self.bundles.borrow().clone();
        for bundle in bundles {
            Self::stop_bundle(&bundle);
        }
        Self::stop_bundle(&self.bundle);
        Ok(())
    }

    fn stop_bundle(bundle: &Rc<Bundle>) {
        if bundle.status().is_terminal() {
            return;
        }
        if let Err(err) = bundle
            .transition(BundleStatus::Stopping)
            .and_then(|()| bundle.transition(BundleStatus::Stopped))
        {
            warn!("BundleManager: stopping '{}' failed: {err}", bundle.name());
        }
    }

    /// App bundles currently known to the kernel, in start order.
    pub fn bundles(&self) -> Vec<Rc<Bundle>> {
        self.bundles.borrow().clone()
    }

    pub fn find_bundle_by_name(&self, name: &str) -> Option<Rc<Bundle>> {
        self.bundles
            .borrow()
            .iter()
            .find(|bundle| bundle.name() == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_ignores_unknown_fields_and_defaults_privileges() {
        let manifest: BundleManifest = serde_json::from_str(
            r#"{
                "id": "a-1",
                "name": "app",
                "entrypoint": "./index.ts",
                "author": "someone",
                "homepage": "https://example.invalid"
            }"#,
        )
        .expect("parse");
        assert_eq!(manifest.id, "a-1");
        assert_eq!(manifest.name, "app");
        assert!(manifest.privileges.is_empty());
    }

    #[test]
    fn manifest_requires_id_and_name() {
        let missing_id = serde_json::from_str::<BundleManifest>(
            r#"{ "name": "app", "entrypoint": "./index.ts" }"#,
        );
        assert!(missing_id.is_err());
        let missing_name = serde_json::from_str::<BundleManifest>(
            r#"{ "id": "a-1", "entrypoint": "./index.ts" }"#,
        );
        assert!(missing_name.is_err());
    }
}
