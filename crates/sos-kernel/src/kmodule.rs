//! Kernel modules: native capabilities exposed to bundles as virtual
//! files under the kernel types path.

use std::rc::Rc;

use log::{debug, info};

use sos_sandbox::{ObjectCreator, Sandbox, Value};
use sos_vfs::exists;

use crate::bundle::{Bundle, SecurityInterceptor};
use crate::kernel::Kernel;
use crate::module::Module;
use crate::origin::Origin;
use crate::KernelResult;

/// A native capability definition. The binder populates the module's
/// exports object through the builder; the kernel deep-freezes the result
/// before any foreign bundle can obtain a handle.
pub trait KernelModule {
    /// Stable module id (a UUID string).
    fn id(&self) -> &str;
    /// Bare-import name bundles use (`import "logger"`).
    fn name(&self) -> &str;
    /// Declaration file describing the API, resolved by the ordinary
    /// script-path rules (usually `/kernel/@types/<name>`).
    fn api_definition_file(&self) -> &str;
    /// Module-level interceptor consulted for `<name>.inject`; `None`
    /// falls back to the kernel bundle's interceptor.
    fn security_interceptor(&self) -> Option<SecurityInterceptor> {
        None
    }
    /// Populates the exports tree.
    fn bind(&self, bundle: &Rc<Bundle>, builder: &mut ObjectCreator<'_>) -> KernelResult<()>;
}

/// Payload of a kernel virtual file: resolves the capability to its
/// module for a calling bundle.
pub struct ModuleCapability {
    module: Rc<Module>,
}

impl ModuleCapability {
    pub(crate) fn new(module: Rc<Module>) -> Self {
        Self { module }
    }

    pub(crate) fn resolve(&self, caller: &Rc<Bundle>) -> Rc<Module> {
        debug!(
            "Kernel: resolving kernel module '{}' for bundle '{}'",
            self.module.name(),
            caller.name()
        );
        self.module.clone()
    }
}

impl Kernel {
    /// Registers one kernel module into the kernel bundle: create the
    /// module entity, load its API definition file when one resolves, run
    /// the binder, and deep-freeze the exports.
    pub fn load_kernel_module(self: &Rc<Self>, definition: &Rc<dyn KernelModule>) -> KernelResult<()> {
        let script_path =
            self.resolve_script_path(&self.bundle, definition.api_definition_file())?;
        let origin = Origin::new(&script_path.path);

        let module = Module::new(definition.id(), definition.name(), origin, &self.bundle)?;
        module.mark_kernel_module();
        module.set_interceptor(definition.security_interceptor());
        self.bundle.add_module(&module);

        if exists(self.bundle.filesystem().as_ref(), &script_path.path) {
            self.load_script_module(
                definition.id(),
                definition.name(),
                &script_path,
                &self.bundle,
            )?;
        } else {
            debug!(
                "Kernel: kernel module '{}' has no API definition file at {}",
                definition.name(),
                script_path.path
            );
        }

        let sandbox = self.bundle.sandbox()?;
        let mut builder = ObjectCreator::new(sandbox.as_ref());
        definition.bind(&self.bundle, &mut builder)?;
        builder
            .build_onto(&module.exports())
            .map_err(|err| crate::KernelError::from_sandbox(&script_path.path, err))?;

        // No caller, proxied or otherwise, may mutate kernel exports.
        sandbox
            .deep_freeze(&Value::Obj(module.exports()))
            .map_err(|err| crate::KernelError::from_sandbox(&script_path.path, err))?;

        info!("Kernel: registered kernel module '{}'", definition.name());
        Ok(())
    }
}
