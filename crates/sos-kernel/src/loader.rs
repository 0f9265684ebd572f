//! The module loader: load, register, link, execute.

use std::rc::Rc;

use log::{debug, info};

use sos_sandbox::{
    FunctionCall, PropertyDescriptor, Sandbox, SandboxError, ScriptObject, Value,
};
use sos_vfs::{path, Vfs};

use crate::bundle::{Bundle, LoaderFrame};
use crate::kernel::Kernel;
use crate::kmodule::ModuleCapability;
use crate::module::Module;
use crate::origin::Origin;
use crate::proxy;
use crate::resolver::ResolvedScriptPath;
use crate::{KernelError, KernelResult};

impl Kernel {
    /// Loads one script as a module of `bundle`: compile (or fetch from
    /// the script cache), register the module entity, run the top-level
    /// with a loader-stack frame held. The frame is popped even when the
    /// run fails; exports the module managed to publish stay visible.
    pub fn load_script_module(
        self: &Rc<Self>,
        id: &str,
        name: &str,
        script_path: &ResolvedScriptPath,
        bundle: &Rc<Bundle>,
    ) -> KernelResult<Rc<Module>> {
        let filename = &script_path.path;
        if !path::is_abs(filename) {
            return Err(KernelError::Load {
                path: filename.clone(),
                message: "only absolute script paths are supported".to_string(),
            });
        }

        let module = match bundle.find_module_by_id(id) {
            Some(module) => {
                if module.is_registered() {
                    debug!(
                        "Kernel: module {} ({id}) is already loaded in bundle {}",
                        module.name(),
                        bundle.name()
                    );
                    return Ok(module);
                }
                module
            }
            None => {
                let module = Module::new(id, name, Origin::new(filename), bundle)?;
                bundle.add_module(&module);
                module
            }
        };

        let program = self.load_script_source(script_path, true)?;

        let value = {
            let _frame = LoaderFrame::push(bundle, id);
            bundle
                .sandbox()?
                .execute(&program)
                .map_err(|err| KernelError::from_sandbox(filename, err))?
        };

        // A module's top-level must not produce a value.
        if value.is_defined() {
            return Err(KernelError::Load {
                path: filename.clone(),
                message: format!(
                    "modules are not supposed to return anything, got {}",
                    value.type_name()
                ),
            });
        }

        Ok(module)
    }

    /// Links and executes a registered module: resolve dependencies left
    /// to right, run the initializer, feed every setter with the (possibly
    /// proxied) dependency exports in order, then run `execute`.
    pub(crate) fn register_module(
        self: &Rc<Self>,
        module: &Rc<Module>,
        dependencies: Vec<String>,
        callback: Value,
        bundle: &Rc<Bundle>,
    ) -> KernelResult<()> {
        info!(
            "Kernel: loading module {} ({}) into bundle {} ({})",
            module.name(),
            module.id(),
            bundle.name(),
            bundle.id()
        );

        let mut resolved = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            resolved.push(self.resolve_dependency(dependency, bundle)?);
        }

        let sandbox = bundle.sandbox()?;
        let origin_path = module.origin().full_path().to_string();

        let context = sandbox.new_object();
        context
            .set("id", Value::string(module.id()))
            .map_err(|err| KernelError::from_sandbox(&origin_path, err))?;

        let export_fn = {
            let exports = module.exports();
            let module_name = module.name();
            sandbox.new_function(
                "export",
                Rc::new(move |call: FunctionCall| {
                    let name = call.argument(0).as_str().map(str::to_string).ok_or_else(
                        || SandboxError::type_error("export name must be a string"),
                    )?;
                    let value = call.argument(1);
                    exports
                        .define_property(
                            &name,
                            PropertyDescriptor::data(value, false, true, false),
                        )
                        .map_err(|err| match err {
                            SandboxError::AlreadyDefined(_) => SandboxError::Execution(format!(
                                "module '{module_name}' exported '{name}' twice"
                            )),
                            other => other,
                        })?;
                    Ok(Value::Undefined)
                }),
            )
        };

        let initializer = callback
            .call(Value::Undefined, &[export_fn, Value::Obj(context)])
            .map_err(|err| KernelError::from_sandbox(&origin_path, err))?;
        let initializer = initializer.as_object().cloned().ok_or_else(|| {
            KernelError::Registration(format!(
                "initializer of module '{}' must return an object",
                module.name()
            ))
        })?;

        let setters = initializer
            .get("setters")
            .map_err(|err| KernelError::from_sandbox(&origin_path, err))?;
        let setters = setters
            .as_object()
            .and_then(|obj| obj.elements())
            .ok_or_else(|| {
                KernelError::Registration(format!(
                    "module '{}' produced no setters array",
                    module.name()
                ))
            })?;
        if setters.len() != resolved.len() {
            return Err(KernelError::Registration(format!(
                "module '{}' declared {} dependencies but provided {} setters",
                module.name(),
                resolved.len(),
                setters.len()
            )));
        }

        for (setter, dependency) in setters.iter().zip(&resolved) {
            let dependency_bundle = dependency.bundle()?;
            let mut exports = Value::Obj(dependency.exports());
            if dependency_bundle.id() != bundle.id() {
                info!(
                    "Kernel: creating security proxy from {}:{} to {}:{}",
                    dependency_bundle.name(),
                    dependency.origin().full_path(),
                    bundle.name(),
                    module.origin().full_path()
                );
                exports = proxy::wrap(&exports, &dependency.name(), &dependency_bundle, bundle);
            }
            setter
                .call(Value::Undefined, &[exports])
                .map_err(|err| KernelError::from_sandbox(&origin_path, err))?;
        }

        let execute = initializer
            .get("execute")
            .map_err(|err| KernelError::from_sandbox(&origin_path, err))?;
        if !execute.is_callable() {
            return Err(KernelError::Registration(format!(
                "module '{}' produced no execute function",
                module.name()
            )));
        }

        debug!("Kernel: executing initializer of module {}", module.name());
        execute
            .call(Value::Undefined, &[])
            .map_err(|err| KernelError::from_sandbox(&origin_path, err))?;

        Ok(())
    }

    /// Resolves one dependency specifier to a module: a virtual kernel
    /// file, an already-loaded module of the caller bundle, or a fresh
    /// recursive load.
    pub(crate) fn resolve_dependency(
        self: &Rc<Self>,
        dependency: &str,
        bundle: &Rc<Bundle>,
    ) -> KernelResult<Rc<Module>> {
        let script_path = self.resolve_script_path(bundle, dependency)?;

        if let Some(kernel_module) = self.to_virtual_kernel_module(&script_path, bundle)? {
            debug!(
                "Kernel: resolved dependency {dependency} [virtual kernel file {}]",
                script_path.path
            );
            kernel_module.is_accessible(bundle)?;
            return Ok(kernel_module);
        }

        if let Some(existing) = bundle.find_module_by_file(&script_path.path) {
            debug!(
                "Kernel: reused already loaded module {dependency} ({}:{}) with id {}",
                bundle.name(),
                script_path.path,
                existing.id()
            );
            return Ok(existing);
        }

        // The probe may have returned the canonical path unchanged; a
        // missing file at this point means no candidate matched at all.
        if !sos_vfs::exists(bundle.filesystem().as_ref(), &script_path.path) {
            return Err(KernelError::PathResolution {
                specifier: dependency.to_string(),
                bundle: bundle.name().to_string(),
                path: script_path.path.clone(),
            });
        }

        debug!(
            "Kernel: resolved dependency {dependency} [{}:{}]",
            bundle.name(),
            script_path.path
        );
        let id = uuid::Uuid::new_v4().to_string();
        self.load_script_module(&id, dependency, &script_path, bundle)
    }

    /// Checks whether a resolved path names a kernel virtual file and, if
    /// so, resolves its capability payload to the kernel module.
    fn to_virtual_kernel_module(
        &self,
        script_path: &ResolvedScriptPath,
        caller: &Rc<Bundle>,
    ) -> KernelResult<Option<Rc<Module>>> {
        let meta = match script_path
            .loader
            .filesystem()
            .stat(&script_path.path)
        {
            Ok(meta) => meta,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(KernelError::read(script_path.path.clone(), err)),
        };
        if meta.is_dir() {
            return Ok(None);
        }
        let Some(capability) = meta.capability else {
            return Ok(None);
        };
        let Some(capability) = capability.downcast_ref::<ModuleCapability>() else {
            return Ok(None);
        };
        Ok(Some(capability.resolve(caller)))
    }
}
