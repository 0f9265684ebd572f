//! The kernel root: the privileged bundle owning the process-wide
//! registry of bundles and modules, and the default wiring.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::info;

use sos_sandbox::{Program, Sandbox, SandboxFactory, Value};
use sos_vfs::SharedVfs;

use crate::bundle::Bundle;
use crate::kmodule::KernelModule;
use crate::manager::{default_bundle_filesystem, NewBundleFilesystem};
use crate::providers::{default_api_providers, ApiProviderBinder};
use crate::script::{FsResourceLoader, ResourceLoader};
use crate::status::BundleStatus;
use crate::transpile::{IdentityTranspiler, TranspileCache, Transpiler};
use crate::{KernelError, KernelResult};

/// Stable id of the kernel bundle.
pub const KERNEL_ID: &str = "8f2b3c4e-91d7-4a5b-b6c0-d41f0e2a7c19";

/// Reserved virtual-filesystem layout.
pub const KERNEL_APPS_PATH: &str = "/kernel/apps";
pub const KERNEL_CACHE_PATH: &str = "/kernel/cache";
pub const KERNEL_TYPES_PATH: &str = "/kernel/@types";
pub const KERNEL_DATA_PATH: &str = "/kernel/data";

/// Wiring for a kernel instance. Every collaborator has a default; the
/// sandbox factory is the one thing embedders must choose.
pub struct KernelConfig {
    pub sandbox_factory: SandboxFactory,
    pub transpiler: Rc<dyn Transpiler>,
    pub resource_loader: Rc<dyn ResourceLoader>,
    pub kernel_modules: Vec<Rc<dyn KernelModule>>,
    pub api_providers: Vec<ApiProviderBinder>,
    pub new_bundle_filesystem: NewBundleFilesystem,
    pub kernel_debug: bool,
}

impl KernelConfig {
    pub fn new(sandbox_factory: SandboxFactory) -> Self {
        Self {
            sandbox_factory,
            transpiler: Rc::new(IdentityTranspiler),
            resource_loader: Rc::new(FsResourceLoader),
            kernel_modules: Vec::new(),
            api_providers: default_api_providers(),
            new_bundle_filesystem: default_bundle_filesystem(),
            kernel_debug: false,
        }
    }

    pub fn with_kernel_module(mut self, module: Rc<dyn KernelModule>) -> Self {
        self.kernel_modules.push(module);
        self
    }

    pub fn with_transpiler(mut self, transpiler: Rc<dyn Transpiler>) -> Self {
        self.transpiler = transpiler;
        self
    }
}

/// The kernel is itself a bundle — the only privileged one — constructed
/// first and owning every other bundle. Single-threaded by design: one
/// process-wide value, no hidden statics.
pub struct Kernel {
    pub(crate) bundle: Rc<Bundle>,
    pub(crate) config: KernelConfig,
    pub(crate) bundles: RefCell<Vec<Rc<Bundle>>>,
    pub(crate) script_cache: RefCell<HashMap<String, Program>>,
    pub(crate) transpile_cache: RefCell<TranspileCache>,
}

impl Kernel {
    /// Boots a kernel over `filesystem`: construct the kernel bundle,
    /// install API providers, register kernel modules, pre-transpile
    /// sources. App bundles start separately via [`Kernel::start`].
    pub fn boot(filesystem: SharedVfs, config: KernelConfig) -> KernelResult<Rc<Kernel>> {
        let sandbox = (config.sandbox_factory)("kernel");
        let bundle = Bundle::new(
            std::rc::Weak::new(),
            "/",
            filesystem.clone(),
            KERNEL_ID,
            "kernel",
            Vec::new(),
            true,
            sandbox,
        )?;

        let transpile_cache =
            TranspileCache::load(filesystem.as_ref(), config.transpiler.version());
        let kernel = Rc::new(Kernel {
            bundle: bundle.clone(),
            config,
            bundles: RefCell::new(Vec::new()),
            script_cache: RefCell::new(HashMap::new()),
            transpile_cache: RefCell::new(transpile_cache),
        });
        bundle.attach_kernel(&kernel);

        for provider in &kernel.config.api_providers {
            provider(&kernel.bundle, &kernel.bundle)?;
        }

        kernel.bundle.transition(BundleStatus::Starting)?;
        let definitions = kernel.config.kernel_modules.clone();
        for definition in &definitions {
            kernel.load_kernel_module(definition)?;
        }

        kernel.transpile_all()?;
        kernel.bundle.transition(BundleStatus::Started)?;
        info!("Kernel: booted with {} kernel module(s)", definitions.len());
        Ok(kernel)
    }

    /// The kernel bundle.
    pub fn bundle(&self) -> &Rc<Bundle> {
        &self.bundle
    }

    /// Loads an entry-point script into the kernel bundle.
    pub fn run_entry_point(self: &Rc<Self>, filename: &str) -> KernelResult<()> {
        let script_path = self.resolve_script_path(&self.bundle, filename)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.load_script_module(&id, "", &script_path, &self.bundle)?;
        Ok(())
    }

    /// Compiles a script from the kernel filesystem and executes it in
    /// `target`'s sandbox (used for shared polyfills).
    pub fn load_plain_script(
        self: &Rc<Self>,
        filename: &str,
        target: &Rc<Bundle>,
    ) -> KernelResult<Value> {
        let script_path = self.resolve_script_path(&self.bundle, filename)?;
        let program = self.load_script_source(&script_path, true)?;
        target
            .sandbox()?
            .execute(&program)
            .map_err(|err| KernelError::from_sandbox(&script_path.path, err))
    }

    pub fn kernel_debug(&self) -> bool {
        self.config.kernel_debug
    }

    /// Number of compiled programs currently memoized.
    pub fn script_cache_len(&self) -> usize {
        self.script_cache.borrow().len()
    }
}
