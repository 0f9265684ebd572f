use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::{debug, info, warn};

use sos_sandbox::{
    FunctionCall, PropertyDescriptor, Sandbox, SandboxError, ScriptObject, SharedSandbox, Value,
};
use sos_vfs::{path, SharedVfs};

use crate::kernel::Kernel;
use crate::module::Module;
use crate::status::BundleStatus;
use crate::{KernelError, KernelResult};

/// Decides whether `caller` may touch `property` on objects this bundle
/// exports. Dotted property paths arrive fully qualified
/// (`logger.log.info.get`).
pub type SecurityInterceptor = Rc<dyn Fn(&Rc<Bundle>, &str) -> bool>;

/// Default grant check: the first dotted component of the property names
/// the privilege the caller must hold (`files.*` needs `PRIVILEGE_FILES`).
pub fn default_security_interceptor() -> SecurityInterceptor {
    Rc::new(|caller: &Rc<Bundle>, property: &str| {
        let first = property.split('.').next().unwrap_or("");
        if first.is_empty() {
            return false;
        }
        let grant = format!("PRIVILEGE_{}", first.to_uppercase());
        caller.privileges().iter().any(|held| held == &grant)
    })
}

/// A named unit of scripts plus native capabilities: exclusive sandbox,
/// composed read-only filesystem view, privilege grants, lifecycle status,
/// and the set of modules it owns.
pub struct Bundle {
    kernel: RefCell<Weak<Kernel>>,
    id: String,
    name: String,
    base_path: String,
    filesystem: SharedVfs,
    privileges: Vec<String>,
    privileged: bool,
    status: Cell<BundleStatus>,
    sandbox: RefCell<Option<SharedSandbox>>,
    interceptor: RefCell<Option<SecurityInterceptor>>,
    modules: RefCell<Vec<Rc<Module>>>,
    loader_stack: RefCell<Vec<String>>,
    proxy_cache: RefCell<HashMap<(String, usize), Value>>,
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Bundle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kernel: Weak<Kernel>,
        base_path: &str,
        filesystem: SharedVfs,
        id: &str,
        name: &str,
        privileges: Vec<String>,
        privileged: bool,
        sandbox: SharedSandbox,
    ) -> KernelResult<Rc<Bundle>> {
        let bundle = Rc::new(Bundle {
            kernel: RefCell::new(kernel),
            id: id.to_string(),
            name: name.to_string(),
            base_path: path::clean(base_path),
            filesystem,
            privileges,
            privileged,
            status: Cell::new(BundleStatus::Installed),
            sandbox: RefCell::new(Some(sandbox)),
            interceptor: RefCell::new(None),
            modules: RefCell::new(Vec::new()),
            loader_stack: RefCell::new(Vec::new()),
            proxy_cache: RefCell::new(HashMap::new()),
        });
        info!("Bundle: Status of '{}' changed to {}", bundle.name, bundle.status.get());
        bundle.install_system_object()?;
        Ok(bundle)
    }

    pub(crate) fn attach_kernel(&self, kernel: &Rc<Kernel>) {
        *self.kernel.borrow_mut() = Rc::downgrade(kernel);
    }

    pub(crate) fn kernel(&self) -> KernelResult<Rc<Kernel>> {
        self.kernel.borrow().upgrade().ok_or_else(|| {
            KernelError::Registration("kernel is gone".to_string())
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn filesystem(&self) -> SharedVfs {
        self.filesystem.clone()
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    pub fn privileges(&self) -> &[String] {
        &self.privileges
    }

    pub fn status(&self) -> BundleStatus {
        self.status.get()
    }

    pub fn sandbox(&self) -> KernelResult<SharedSandbox> {
        self.sandbox.borrow().clone().ok_or_else(|| KernelError::Lifecycle {
            bundle: self.name.clone(),
            from: self.status.get(),
            to: self.status.get(),
        })
    }

    /// The bundle's interceptor: a custom one if installed, otherwise the
    /// privilege-grant default.
    pub fn security_interceptor(&self) -> Option<SecurityInterceptor> {
        Some(
            self.interceptor
                .borrow()
                .clone()
                .unwrap_or_else(default_security_interceptor),
        )
    }

    pub fn set_security_interceptor(&self, interceptor: SecurityInterceptor) {
        *self.interceptor.borrow_mut() = Some(interceptor);
    }

    /// Moves the bundle along a legal state-machine edge.
    pub(crate) fn transition(&self, to: BundleStatus) -> KernelResult<()> {
        let from = self.status.get();
        if !from.can_transition(to) {
            return Err(KernelError::Lifecycle {
                bundle: self.name.clone(),
                from,
                to,
            });
        }
        self.status.set(to);
        info!("Bundle: Status of '{}' changed to {}", self.name, to);
        if to == BundleStatus::Stopped {
            // The sandbox is destroyed exactly once, here.
            self.sandbox.borrow_mut().take();
            self.modules.borrow_mut().clear();
            self.proxy_cache.borrow_mut().clear();
        }
        Ok(())
    }

    /// Marks the bundle failed if the current state allows it.
    pub(crate) fn fail(&self) {
        let from = self.status.get();
        if from.can_transition(BundleStatus::Failed) {
            self.status.set(BundleStatus::Failed);
            warn!("Bundle: Status of '{}' changed to FAILED", self.name);
        }
    }

    pub fn find_module_by_id(&self, id: &str) -> Option<Rc<Module>> {
        self.modules
            .borrow()
            .iter()
            .find(|module| module.id() == id)
            .cloned()
    }

    pub fn find_module_by_name(&self, name: &str) -> Option<Rc<Module>> {
        self.modules
            .borrow()
            .iter()
            .find(|module| module.name() == name)
            .cloned()
    }

    pub fn find_module_by_file(&self, file: &str) -> Option<Rc<Module>> {
        let file = path::clean(file);
        self.modules
            .borrow()
            .iter()
            .find(|module| module.origin().full_path() == file)
            .cloned()
    }

    pub fn modules(&self) -> Vec<Rc<Module>> {
        self.modules.borrow().clone()
    }

    pub(crate) fn add_module(&self, module: &Rc<Module>) {
        self.modules.borrow_mut().push(module.clone());
    }

    pub(crate) fn remove_module(&self, id: &str) {
        self.modules.borrow_mut().retain(|module| module.id() != id);
    }

    pub(crate) fn push_loader_stack(&self, id: &str) {
        self.loader_stack.borrow_mut().push(id.to_string());
    }

    pub(crate) fn pop_loader_stack(&self) -> Option<String> {
        self.loader_stack.borrow_mut().pop()
    }

    pub(crate) fn peek_loader_stack(&self) -> Option<String> {
        self.loader_stack.borrow().last().cloned()
    }

    /// Current depth of the loader stack; balanced around every load,
    /// successful or not.
    pub fn loader_stack_depth(&self) -> usize {
        self.loader_stack.borrow().len()
    }

    pub(crate) fn proxy_cache_get(&self, caller_id: &str, target: usize) -> Option<Value> {
        self.proxy_cache
            .borrow()
            .get(&(caller_id.to_string(), target))
            .cloned()
    }

    pub(crate) fn proxy_cache_put(&self, caller_id: &str, target: usize, proxy: Value) {
        self.proxy_cache
            .borrow_mut()
            .insert((caller_id.to_string(), target), proxy);
    }

    /// Installs the bundle-global `System` object carrying the single
    /// host-provided `register` primitive.
    fn install_system_object(self: &Rc<Self>) -> KernelResult<()> {
        let sandbox = self.sandbox()?;
        let system = sandbox.new_object();
        let weak = Rc::downgrade(self);
        let register = sandbox.new_function(
            "<module-init>",
            Rc::new(move |call: FunctionCall| {
                let bundle = weak.upgrade().ok_or_else(|| {
                    SandboxError::Execution("bundle is gone".to_string())
                })?;
                bundle
                    .system_register(call)
                    .map_err(KernelError::into_sandbox)
            }),
        );
        system
            .define_property(
                "register",
                PropertyDescriptor::data(register, false, false, false),
            )
            .map_err(|err| KernelError::from_sandbox("System.register", err))?;
        sandbox
            .global()
            .set("System", Value::Obj(system))
            .map_err(|err| KernelError::from_sandbox("System", err))?;
        Ok(())
    }

    /// The register primitive: recovers the loading module from the loader
    /// stack, validates the argument shape, and hands off to the kernel.
    fn system_register(self: &Rc<Self>, call: FunctionCall) -> KernelResult<Value> {
        let module = self
            .peek_loader_stack()
            .and_then(|id| self.find_module_by_id(&id))
            .ok_or_else(|| {
                KernelError::Registration(
                    "register called outside of a module load".to_string(),
                )
            })?;
        module.mark_registered()?;

        let mut arg_index = 0;
        let first = call.argument(0);
        if let Some(name) = first.as_str() {
            module.set_name(name);
            arg_index += 1;
        }

        let deps_value = call.argument(arg_index);
        let elements = deps_value
            .as_object()
            .and_then(|obj| obj.elements())
            .ok_or_else(|| {
                KernelError::Registration(
                    "neither a name nor a dependency array was passed to register".to_string(),
                )
            })?;
        let mut dependencies = Vec::with_capacity(elements.len());
        for element in elements {
            match element.as_str() {
                Some(dep) => dependencies.push(dep.to_string()),
                None => {
                    return Err(KernelError::Registration(format!(
                        "dependency specifiers must be strings, got {}",
                        element.type_name()
                    )))
                }
            }
        }

        let callback = call.argument(arg_index + 1);
        if !callback.is_callable() {
            return Err(KernelError::Registration(
                "register requires an initializer function".to_string(),
            ));
        }

        debug!(
            "Bundle: {} registering module {} with {} dependencies",
            self.name,
            module.name(),
            dependencies.len()
        );
        let kernel = self.kernel()?;
        kernel.register_module(&module, dependencies, callback, self)?;
        Ok(Value::Undefined)
    }
}

/// Scoped loader-stack frame: pushed before a module's top-level runs,
/// popped on drop so unwinds stay balanced.
pub(crate) struct LoaderFrame {
    bundle: Rc<Bundle>,
}

impl LoaderFrame {
    pub(crate) fn push(bundle: &Rc<Bundle>, id: &str) -> Self {
        bundle.push_loader_stack(id);
        Self {
            bundle: bundle.clone(),
        }
    }
}

impl Drop for LoaderFrame {
    fn drop(&mut self) {
        self.bundle.pop_loader_stack();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sos_vfs::MemFs;
    use std::rc::Weak as RcWeak;

    fn bundle(privileges: &[&str]) -> Rc<Bundle> {
        Bundle::new(
            RcWeak::new(),
            "/kernel/apps/demo",
            Rc::new(MemFs::new()),
            "b-1",
            "demo",
            privileges.iter().map(|p| p.to_string()).collect(),
            false,
            sos_engine::standalone("demo"),
        )
        .expect("bundle")
    }

    #[test]
    fn default_interceptor_matches_the_first_dotted_segment() {
        let caller = bundle(&["PRIVILEGE_FILES"]);
        let check = default_security_interceptor();
        assert!(check(&caller, "files.resolvePath.get"));
        assert!(check(&caller, "files.apply"));
        assert!(!check(&caller, "logger.log.info.get"));
        assert!(!check(&caller, ""));
    }

    #[test]
    fn loader_frames_pop_on_drop() {
        let bundle = bundle(&[]);
        assert_eq!(bundle.loader_stack_depth(), 0);
        {
            let _outer = LoaderFrame::push(&bundle, "m-1");
            assert_eq!(bundle.peek_loader_stack().as_deref(), Some("m-1"));
            {
                let _inner = LoaderFrame::push(&bundle, "m-2");
                assert_eq!(bundle.loader_stack_depth(), 2);
                assert_eq!(bundle.peek_loader_stack().as_deref(), Some("m-2"));
            }
            assert_eq!(bundle.peek_loader_stack().as_deref(), Some("m-1"));
        }
        assert_eq!(bundle.loader_stack_depth(), 0);
    }

    #[test]
    fn illegal_transitions_are_lifecycle_errors() {
        let bundle = bundle(&[]);
        let err = bundle
            .transition(BundleStatus::Started)
            .expect_err("INSTALLED -> STARTED is not an edge");
        assert!(matches!(err, KernelError::Lifecycle { .. }));
        bundle.transition(BundleStatus::Starting).expect("starting");
        bundle.transition(BundleStatus::Started).expect("started");
    }

    #[test]
    fn the_register_primitive_is_installed_at_construction() {
        let bundle = bundle(&[]);
        let sandbox = bundle.sandbox().expect("sandbox");
        let system = sandbox.global().get("System").expect("System");
        let register = system
            .as_object()
            .expect("object")
            .get("register")
            .expect("register");
        assert!(register.is_callable());
    }

    #[test]
    fn stopping_drops_the_sandbox_once() {
        let bundle = bundle(&[]);
        bundle.transition(BundleStatus::Starting).expect("starting");
        bundle.transition(BundleStatus::Started).expect("started");
        bundle.transition(BundleStatus::Stopping).expect("stopping");
        bundle.transition(BundleStatus::Stopped).expect("stopped");
        assert!(bundle.sandbox().is_err());
        assert!(bundle
            .transition(BundleStatus::Starting)
            .is_err());
    }
}
